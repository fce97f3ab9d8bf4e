//! Shared configuration model for the apkrelay release pipeline.
//!
//! The publisher crate consumes [`RelayConfig`] as an immutable value built
//! once at start-up, and [`LogicalVariant`] as the vocabulary for the build
//! variants a release is made of.

pub mod config;
pub mod variant;

pub use config::{
    ArchiveConfig, ArtifactsConfig, ChatConfig, ConfigError, IdentityConfig, LinkButton,
    PathsConfig, RelayConfig, RetryConfig, StoreConfig,
};
pub use variant::{LogicalVariant, UnknownVariant};

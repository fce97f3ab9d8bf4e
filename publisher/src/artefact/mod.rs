//! Acquisition and integrity of release artefacts.
//!
//! # Sub-modules
//!
//! - [`naming`]: file naming convention (`ArtefactName`).
//! - [`probe`]: classification of store response bodies.
//! - [`download`]: store trait and HTTP implementation.
//! - [`retry`]: polling policy with capped exponential backoff.
//! - [`fetcher`]: polling download with atomic persistence.
//! - [`reference`]: locally stored artefacts (`ArtifactRef`).
//! - [`resolver`]: signed-over-unsigned selection per variant.
//! - [`checksum`]: SHA-256 manifest building and writing.
//! - [`sha256_digest`]: SHA-256 digest newtype.
//! - [`error`]: validation errors for names and digests.

pub mod checksum;
pub mod download;
pub mod error;
pub mod fetcher;
pub mod naming;
pub mod probe;
pub mod reference;
pub mod resolver;
pub mod retry;
pub mod sha256_digest;

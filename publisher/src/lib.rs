//! apkrelay publisher library.
//!
//! This crate fetches nightly APK builds from an eventually consistent build
//! store, resolves one authoritative artefact per CPU/ABI variant, writes a
//! checksum manifest, and publishes the release to a git archive and a chat
//! channel. It backs the `apkrelay` binary and can be driven
//! programmatically for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Store access, polling, variant resolution and checksums
//! - [`cancel`] - Cooperative cancellation flag
//! - [`cli`] - Command-line argument definitions
//! - [`error`] - Top-level error type and exit codes
//! - [`output`] - Progress and outcome lines
//! - [`pipeline`] - Release run orchestration
//! - [`process`] - Subprocess execution with timeouts
//! - [`publish`] - Distribution channels
//! - [`release`] - Commit metadata and changelog excerpts
//! - [`workdir`] - Exclusive ownership of the working directory

pub mod artefact;
pub mod cancel;
pub mod cli;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod publish;
pub mod release;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod workdir;

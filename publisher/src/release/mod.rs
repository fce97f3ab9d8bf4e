//! Release metadata: the commit being released and its changelog.

pub mod changelog;
pub mod commit_id;
pub mod metadata;

pub use commit_id::CommitId;
pub use metadata::{ReleaseMetadataReader, ReleaseRecord};

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while reading release metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The descriptor is not valid JSON or lacks a required field.
    #[error("malformed release descriptor: {reason}")]
    Malformed {
        /// What was wrong with the descriptor.
        reason: String,
    },

    /// The descriptor or changelog could not be read.
    #[error("cannot read {path}: {source}")]
    Unreadable {
        /// The file that could not be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

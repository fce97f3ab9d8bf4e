//! Error types for artefact names.
//!
//! Each variant provides a descriptive message identifying the invalid input
//! and the constraint that was violated.

use thiserror::Error;

/// Errors arising from invalid artefact-related values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtefactError {
    /// The file name does not carry the configured artefact extension.
    #[error("\"{name}\" is not a .{extension} artefact")]
    WrongExtension {
        /// The rejected file name.
        name: String,
        /// The extension that was expected.
        extension: String,
    },

    /// The file name does not contain any known build variant token.
    #[error("\"{name}\" does not name a known build variant")]
    UnknownVariant {
        /// The rejected file name.
        name: String,
    },

    /// The value is a path rather than a bare file name.
    #[error("\"{name}\" must be a bare file name")]
    NotAFileName {
        /// The rejected value.
        name: String,
    },
}

/// Result type alias using [`ArtefactError`].
pub type Result<T> = std::result::Result<T, ArtefactError>;

//! Top-level error type for the apkrelay CLI.
//!
//! Stage-specific errors live next to the code that raises them; this module
//! folds them into the single error a command returns, and decides the
//! process exit code.

use crate::artefact::checksum::ChecksumError;
use crate::cancel::INTERRUPTED_EXIT_CODE;
use crate::pipeline::PipelineError;
use crate::publish::PublishError;
use crate::publish::ledger::LedgerError;
use apkrelay::ConfigError;
use thiserror::Error;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration could not be loaded or is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A fatal pipeline stage failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A publisher could not be set up.
    #[error("publisher setup failed: {0}")]
    PublisherSetup(#[from] PublishError),

    /// The publish ledger could not be read.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A standalone manifest could not be computed.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// The run finished but at least one publisher failed.
    #[error("{failed} publisher(s) failed")]
    PublishFailed {
        /// How many publishers failed.
        failed: usize,
    },

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    /// Process exit code for this error.
    ///
    /// Configuration problems exit with 2 so that schedulers can tell a
    /// broken setup from a failed release. An interrupted run exits with
    /// 130, the shell convention for `SIGINT`.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay_publisher::error::RelayError;
    ///
    /// assert_eq!(RelayError::PublishFailed { failed: 1 }.exit_code(), 1);
    /// ```
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::PublisherSetup(_) => 2,
            Self::Pipeline(PipelineError::Cancelled { .. }) => INTERRUPTED_EXIT_CODE,
            _ => 1,
        }
    }
}

/// Result alias for top-level commands.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use apkrelay::LogicalVariant;
    use rstest::rstest;

    #[rstest]
    #[case(
        RelayError::Config(ConfigError::Invalid { field: "store.base_url", reason: "empty".to_owned() }),
        2
    )]
    #[case(RelayError::PublisherSetup(PublishError::MissingMetadata), 2)]
    #[case(
        RelayError::Pipeline(PipelineError::MissingVariant { variant: LogicalVariant::X86 }),
        1
    )]
    #[case(RelayError::PublishFailed { failed: 2 }, 1)]
    #[case(RelayError::Pipeline(PipelineError::Cancelled { stage: "fetch" }), 130)]
    fn exit_codes_separate_setup_release_and_interrupts(
        #[case] err: RelayError,
        #[case] code: i32,
    ) {
        assert_eq!(err.exit_code(), code);
    }

    #[rstest]
    fn pipeline_errors_keep_their_message() {
        let err = RelayError::from(PipelineError::Cancelled { stage: "publish" });
        assert_eq!(err.to_string(), "run cancelled before publish");
    }
}

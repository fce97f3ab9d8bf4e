//! Distribution channels for a resolved release.
//!
//! Every channel implements [`Publisher`]. A publish call receives the
//! complete [`PublishRequest`] and either delivers the release, declines
//! with a reason ([`Delivery::Skipped`]), or fails with a [`PublishError`].
//! The caller folds the result into a [`PublishOutcome`], so one failing
//! channel never hides the result of another.
//!
//! # Sub-modules
//!
//! - [`caption`]: announcement text and link buttons.
//! - [`chat`]: chat broadcast publisher over a [`chat::ChatChannel`].
//! - [`telegram`]: Telegram Bot API channel.
//! - [`multipart`]: `multipart/form-data` body encoding.
//! - [`git`]: git archive publisher.
//! - [`ledger`]: publish ledger for idempotent re-runs.

pub mod caption;
pub mod chat;
pub mod git;
pub mod ledger;
pub mod multipart;
pub mod telegram;

use crate::artefact::checksum::Manifest;
use crate::artefact::resolver::ArtifactSet;
use crate::release::ReleaseRecord;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use thiserror::Error;

/// Distribution channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PublishTarget {
    /// Git-based artefact archive.
    Git,
    /// Chat broadcast channel.
    Chat,
}

impl PublishTarget {
    /// Stable lowercase label used in output and in the ledger.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal status of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// The release was delivered.
    Published,
    /// The channel deliberately did nothing.
    Skipped,
    /// The channel attempted delivery and failed.
    Failed,
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Published => "published",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// Successful result of a publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The release was delivered.
    Published {
        /// Human-readable summary.
        detail: String,
    },
    /// Nothing was done, for the stated reason.
    Skipped {
        /// Why the channel declined.
        reason: String,
    },
}

impl Delivery {
    /// Shorthand for [`Delivery::Published`].
    #[must_use]
    pub fn published(detail: impl Into<String>) -> Self {
        Self::Published {
            detail: detail.into(),
        }
    }

    /// Shorthand for [`Delivery::Skipped`].
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Errors raised by a channel.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Credentials were missing or rejected.
    #[error("authentication failed: {reason}")]
    AuthFailure {
        /// What the remote side reported.
        reason: String,
    },

    /// The remote service could not be reached or rejected the request.
    #[error("network failure: {reason}")]
    NetworkFailure {
        /// What went wrong.
        reason: String,
    },

    /// The channel needs release metadata and none was available.
    #[error("missing metadata")]
    MissingMetadata,

    /// A git command failed.
    #[error("git {operation} failed: {message}")]
    Git {
        /// The git operation that failed (e.g. "commit").
        operation: &'static str,
        /// The captured error output.
        message: String,
    },

    /// A local file operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being accessed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Everything a channel needs to publish one release.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    /// The authoritative artefacts.
    pub set: &'a ArtifactSet,
    /// Their checksums.
    pub manifest: &'a Manifest,
    /// Where the rendered manifest was written.
    pub manifest_path: &'a Utf8Path,
    /// Release metadata, when it could be read.
    pub release: Option<&'a ReleaseRecord>,
    /// Changelog excerpt, when one is configured.
    pub changelog: Option<&'a str>,
}

/// One distribution channel.
pub trait Publisher: Send + Sync {
    /// The channel kind, used to label the outcome.
    fn target(&self) -> PublishTarget;

    /// Publish the release.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] when delivery fails. A deliberate no-op is
    /// reported as [`Delivery::Skipped`], not as an error.
    fn publish(&self, request: &PublishRequest<'_>) -> Result<Delivery, PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn target(&self) -> PublishTarget {
        (**self).target()
    }

    fn publish(&self, request: &PublishRequest<'_>) -> Result<Delivery, PublishError> {
        (**self).publish(request)
    }
}

impl<P: Publisher + ?Sized> Publisher for std::sync::Arc<P> {
    fn target(&self) -> PublishTarget {
        (**self).target()
    }

    fn publish(&self, request: &PublishRequest<'_>) -> Result<Delivery, PublishError> {
        (**self).publish(request)
    }
}

/// The terminal record of one channel for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Which channel.
    pub target: PublishTarget,
    /// What happened.
    pub status: PublishStatus,
    /// Human-readable detail.
    pub detail: String,
}

impl PublishOutcome {
    /// Fold a publish result into an outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay_publisher::publish::{
    ///     PublishError, PublishOutcome, PublishStatus, PublishTarget,
    /// };
    ///
    /// let outcome = PublishOutcome::from_result(
    ///     PublishTarget::Chat,
    ///     Err(PublishError::MissingMetadata),
    /// );
    /// assert_eq!(outcome.status, PublishStatus::Failed);
    /// assert_eq!(outcome.detail, "missing metadata");
    /// ```
    #[must_use]
    pub fn from_result(target: PublishTarget, result: Result<Delivery, PublishError>) -> Self {
        let (status, detail) = match result {
            Ok(Delivery::Published { detail }) => (PublishStatus::Published, detail),
            Ok(Delivery::Skipped { reason }) => (PublishStatus::Skipped, reason),
            Err(err) => (PublishStatus::Failed, err.to_string()),
        };
        Self {
            target,
            status,
            detail,
        }
    }

    /// An outcome for a channel that was not attempted.
    #[must_use]
    pub fn skipped(target: PublishTarget, reason: impl Into<String>) -> Self {
        Self {
            target,
            status: PublishStatus::Skipped,
            detail: reason.into(),
        }
    }

    /// An outcome for a channel that failed outside its own error handling.
    #[must_use]
    pub fn failed(target: PublishTarget, detail: impl Into<String>) -> Self {
        Self {
            target,
            status: PublishStatus::Failed,
            detail: detail.into(),
        }
    }

    /// Whether the outcome counts as a success for the run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status != PublishStatus::Failed
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.target, self.status, self.detail)
    }
}

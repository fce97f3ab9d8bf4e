//! Polling download of a single artefact.
//!
//! The fetcher asks the store for a named object until the body passes the
//! [`BodyProbe`], then persists it atomically: the body is written to a
//! temporary file beside the destination and renamed into place, so a
//! partial artefact is never visible under its final name.

use super::download::{ArtefactStore, DownloadError};
use super::error::ArtefactError;
use super::naming::ArtefactName;
use super::probe::{BodyProbe, BodyVerdict, NotReadyReason};
use super::reference::ArtifactRef;
use super::retry::RetryPolicy;
use crate::cancel::CancellationToken;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Longest uninterrupted sleep between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Why a single attempt did not produce an artefact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The store answered, but the object is not there yet.
    NotReady(NotReadyReason),
    /// The store reported the object as missing (HTTP 404).
    Missing,
    /// The request itself failed.
    Transport(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady(reason) => write!(f, "not ready: {reason}"),
            Self::Missing => f.write_str("not ready: object missing"),
            Self::Transport(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

impl From<DownloadError> for AttemptFailure {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::NotFound { .. } => Self::Missing,
            DownloadError::HttpError { reason, .. } => Self::Transport(reason),
        }
    }
}

/// Errors raised while fetching an artefact.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every permitted attempt failed.
    #[error("gave up on {name} after {attempts} attempt(s); last attempt: {last}")]
    Exhausted {
        /// The requested file name.
        name: String,
        /// Number of attempts made.
        attempts: u32,
        /// Outcome of the final attempt.
        last: AttemptFailure,
    },

    /// The requested name does not follow the artefact naming convention.
    #[error("refusing to fetch {name}: {source}")]
    UnrecognisedName {
        /// The requested file name.
        name: String,
        /// Why the name was rejected.
        #[source]
        source: ArtefactError,
    },

    /// Cancellation was requested before an artefact arrived.
    #[error("fetch of {name} was cancelled")]
    Cancelled {
        /// The requested file name.
        name: String,
    },

    /// Persisting the artefact failed.
    #[error("failed to store {path}: {source}")]
    Io {
        /// The destination path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Downloads artefacts from a store into a local directory.
pub struct ArtifactFetcher<'a> {
    store: &'a dyn ArtefactStore,
    probe: BodyProbe,
    extension: String,
    cancel: CancellationToken,
}

impl<'a> ArtifactFetcher<'a> {
    /// Create a fetcher for artefacts with the given extension.
    #[must_use]
    pub fn new(
        store: &'a dyn ArtefactStore,
        probe: BodyProbe,
        extension: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            probe,
            extension: extension.into(),
            cancel,
        }
    }

    /// Fetch `name` into the `destination` directory.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::UnrecognisedName`] without contacting the store
    /// when `name` does not classify, [`FetchError::Exhausted`] when the
    /// policy's attempts run out, [`FetchError::Cancelled`] when the token is
    /// raised, and [`FetchError::Io`] when the artefact cannot be persisted.
    pub fn fetch(
        &self,
        name: &str,
        destination: &Utf8Path,
        policy: &RetryPolicy,
    ) -> Result<ArtifactRef, FetchError> {
        let parsed =
            ArtefactName::parse(name, &self.extension).map_err(|source| {
                FetchError::UnrecognisedName {
                    name: name.to_owned(),
                    source,
                }
            })?;
        let url = self.store.object_url(name);
        let mut rng = rand::rng();
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    name: name.to_owned(),
                });
            }
            attempt = attempt.saturating_add(1);

            let failure = match self.store.retrieve(name) {
                Ok(body) => match self.probe.classify(&body) {
                    BodyVerdict::Valid => {
                        let path = persist(destination, name, &body)?;
                        debug!("{name}: stored {} bytes after {attempt} attempt(s)", body.len());
                        return Ok(ArtifactRef::new(&parsed, path).with_remote_url(url));
                    }
                    BodyVerdict::NotReady(reason) => AttemptFailure::NotReady(reason),
                },
                Err(err) => AttemptFailure::from(err),
            };
            debug!("{name}: attempt {attempt} failed ({failure})");

            if !policy.allows_retry_after(attempt) {
                return Err(FetchError::Exhausted {
                    name: name.to_owned(),
                    attempts: attempt,
                    last: failure,
                });
            }
            self.wait(policy.delay_after(attempt, &mut rng));
        }
    }

    fn wait(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.cancel.is_cancelled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

fn persist(directory: &Utf8Path, name: &str, body: &[u8]) -> Result<Utf8PathBuf, FetchError> {
    let path = directory.join(name);
    let io_error = |source| FetchError::Io {
        path: path.clone(),
        source,
    };
    let mut staged = NamedTempFile::new_in(directory).map_err(io_error)?;
    staged.write_all(body).map_err(io_error)?;
    staged.as_file().sync_all().map_err(io_error)?;
    staged.persist(&path).map_err(|err| io_error(err.error))?;
    Ok(path)
}

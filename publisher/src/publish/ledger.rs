//! Publish ledger for idempotent re-runs.
//!
//! The ledger records which `(target, release)` pairs were published
//! successfully. A re-run for the same release skips those channels instead
//! of announcing or pushing twice. The ledger is a small JSON document:
//!
//! ```json
//! { "entries": [ { "target": "chat", "release": "abcdef1234567" } ] }
//! ```

use super::{Delivery, PublishError, PublishRequest, PublishTarget, Publisher};
use camino::{Utf8Path, Utf8PathBuf};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Errors that prevent ledger persistence.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Reading the ledger file failed.
    #[error("failed to read ledger {path}: {source}")]
    Read {
        /// File path that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing the ledger failed.
    #[error("failed to serialize ledger: {source}")]
    Serialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing the ledger file failed.
    #[error("failed to write ledger {path}: {source}")]
    Write {
        /// File path that could not be written.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct LedgerEntry {
    target: String,
    release: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerFile {
    entries: BTreeSet<LedgerEntry>,
}

/// Persistent record of successful publications.
#[derive(Debug)]
pub struct PublishLedger {
    path: Utf8PathBuf,
    state: Mutex<LedgerFile>,
    recovered_from_corrupt_file: bool,
}

impl PublishLedger {
    /// Load the ledger at `path`. A missing file yields an empty ledger; a
    /// malformed one is reset and reported through
    /// [`recovered_from_corrupt_file`](Self::recovered_from_corrupt_file).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] when an existing file cannot be read.
    pub fn load(path: &Utf8Path) -> Result<Self, LedgerError> {
        let (state, recovered_from_corrupt_file) = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| LedgerError::Read {
                path: path.to_owned(),
                source,
            })?;
            match serde_json::from_str::<LedgerFile>(&content) {
                Ok(state) => (state, false),
                Err(_) => (LedgerFile::default(), true),
            }
        } else {
            (LedgerFile::default(), false)
        };
        Ok(Self {
            path: path.to_owned(),
            state: Mutex::new(state),
            recovered_from_corrupt_file,
        })
    }

    /// Returns true when a malformed ledger file was reset to empty.
    #[must_use]
    pub const fn recovered_from_corrupt_file(&self) -> bool {
        self.recovered_from_corrupt_file
    }

    /// Whether `target` already published `release`.
    #[must_use]
    pub fn contains(&self, target: PublishTarget, release: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains(&entry(target, release))
    }

    /// Record a successful publication and persist the ledger atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger cannot be written.
    pub fn record(&self, target: PublishTarget, release: &str) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.entries.insert(entry(target, release)) {
            return Ok(());
        }
        self.persist(&state)
    }

    fn persist(&self, state: &LedgerFile) -> Result<(), LedgerError> {
        let write_error = |source| LedgerError::Write {
            path: self.path.clone(),
            source,
        };
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_error)?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|source| LedgerError::Serialize { source })?;
        let mut staged = NamedTempFile::new_in(parent).map_err(write_error)?;
        staged.write_all(json.as_bytes()).map_err(write_error)?;
        staged
            .persist(&self.path)
            .map_err(|err| write_error(err.error))?;
        Ok(())
    }
}

fn entry(target: PublishTarget, release: &str) -> LedgerEntry {
    LedgerEntry {
        target: target.label().to_owned(),
        release: release.to_owned(),
    }
}

/// Wraps a publisher so that recorded releases are skipped.
///
/// Publications without release metadata have no identity to record and
/// always go through to the inner publisher.
pub struct LedgeredPublisher<P> {
    inner: P,
    ledger: Arc<PublishLedger>,
}

impl<P: Publisher> LedgeredPublisher<P> {
    /// Wrap `inner` with `ledger`.
    #[must_use]
    pub const fn new(inner: P, ledger: Arc<PublishLedger>) -> Self {
        Self { inner, ledger }
    }
}

impl<P: Publisher> Publisher for LedgeredPublisher<P> {
    fn target(&self) -> PublishTarget {
        self.inner.target()
    }

    fn publish(&self, request: &PublishRequest<'_>) -> Result<Delivery, PublishError> {
        let target = self.inner.target();
        let release = request.release.map(|record| record.full_id.as_str());
        if release.is_some_and(|release| self.ledger.contains(target, release)) {
            return Ok(Delivery::skipped("already published"));
        }

        let delivery = self.inner.publish(request)?;
        if let (Delivery::Published { .. }, Some(release)) = (&delivery, release) {
            if let Err(err) = self.ledger.record(target, release) {
                warn!("{target}: published but could not update the ledger: {err}");
            }
        }
        Ok(delivery)
    }
}

//! SHA-256 checksum manifest for a resolved artefact set.
//!
//! The manifest uses the `sha256sum` text format, one
//! `<hex digest>  <file name>` line per artefact, sorted by file name, so
//! the same files always render to byte-identical text and the output can
//! be checked with `sha256sum -c`.

use super::resolver::ArtifactSet;
use super::sha256_digest::Sha256Digest;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::File;
use std::io::Write;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Algorithm label recorded for every entry.
pub const ALGORITHM: &str = "sha256";

/// Errors raised while building or writing a manifest.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// An artefact could not be opened or read.
    #[error("cannot read artefact {path}: {source}")]
    Unreadable {
        /// The artefact path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be written.
    #[error("cannot write manifest {path}: {source}")]
    Io {
        /// The manifest path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// The digest of one artefact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// The artefact's location on local storage.
    pub artifact_path: Utf8PathBuf,
    /// Always [`ALGORITHM`].
    pub algorithm: &'static str,
    /// Lowercase hex digest.
    pub digest: Sha256Digest,
}

impl ChecksumEntry {
    /// The bare file name recorded in the manifest.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.artifact_path
            .file_name()
            .unwrap_or(self.artifact_path.as_str())
    }
}

/// Checksums for every member of an artefact set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ChecksumEntry>,
}

impl Manifest {
    /// Build a manifest from entries in any order.
    #[must_use]
    pub fn from_entries(mut entries: Vec<ChecksumEntry>) -> Self {
        entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));
        Self { entries }
    }

    /// Entries sorted by file name.
    #[must_use]
    pub fn entries(&self) -> &[ChecksumEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the manifest in `sha256sum` format.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay_publisher::artefact::checksum::{ALGORITHM, ChecksumEntry, Manifest};
    /// use apkrelay_publisher::artefact::sha256_digest::Sha256Digest;
    ///
    /// let manifest = Manifest::from_entries(vec![ChecksumEntry {
    ///     artifact_path: "out/app-x86.apk".into(),
    ///     algorithm: ALGORITHM,
    ///     digest: Sha256Digest::of_bytes(b""),
    /// }]);
    /// assert_eq!(
    ///     manifest.render(),
    ///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855  app-x86.apk\n"
    /// );
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{}  {}\n", entry.digest, entry.file_name()))
            .collect()
    }

    /// Atomically write the rendered manifest to `dir/name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Io`] if the file cannot be written.
    pub fn write_to(&self, dir: &Utf8Path, name: &str) -> Result<Utf8PathBuf, ChecksumError> {
        let path = dir.join(name);
        let io_error = |source| ChecksumError::Io {
            path: path.clone(),
            source,
        };
        let mut staged = NamedTempFile::new_in(dir).map_err(io_error)?;
        staged
            .write_all(self.render().as_bytes())
            .map_err(io_error)?;
        staged.persist(&path).map_err(|err| io_error(err.error))?;
        Ok(path)
    }
}

/// Computes digests for a resolved set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumManifestBuilder;

impl ChecksumManifestBuilder {
    /// Stream every artefact in `set` through SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Unreadable`] when an artefact has vanished or
    /// cannot be read. The read is not retried.
    pub fn build(&self, set: &ArtifactSet) -> Result<Manifest, ChecksumError> {
        let entries = set
            .values()
            .map(|artifact| {
                let path = artifact.local_path();
                let unreadable = |source| ChecksumError::Unreadable {
                    path: path.to_owned(),
                    source,
                };
                let mut file = File::open(path).map_err(unreadable)?;
                let digest = Sha256Digest::of_reader(&mut file).map_err(unreadable)?;
                Ok(ChecksumEntry {
                    artifact_path: path.to_owned(),
                    algorithm: ALGORITHM,
                    digest,
                })
            })
            .collect::<Result<Vec<_>, ChecksumError>>()?;
        Ok(Manifest::from_entries(entries))
    }
}

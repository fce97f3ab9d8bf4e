//! Classification of store responses.
//!
//! The build store is eventually consistent and answers requests for objects
//! it has not produced yet with a placeholder body instead of an error
//! status. A body is therefore only accepted once it looks like a real
//! artefact: non-empty, large enough, carrying the archive magic when
//! required, and free of the store's missing-object marker.

use apkrelay::StoreConfig;
use std::fmt;

/// Local file header that starts every ZIP (and therefore APK) archive.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Verdict for one response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyVerdict {
    /// The body is a complete artefact and may be persisted.
    Valid,
    /// The store has not finished producing the object.
    NotReady(NotReadyReason),
}

/// Why a body was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The body was empty.
    Empty,
    /// The body equals or contains the missing-object marker.
    MarkerPresent,
    /// The body is smaller than the configured minimum.
    TooSmall,
    /// The body does not start with the archive magic.
    NotAnArchive,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Empty => "empty body",
            Self::MarkerPresent => "store returned its not-found placeholder",
            Self::TooSmall => "body smaller than the minimum artefact size",
            Self::NotAnArchive => "body is not an archive",
        };
        f.write_str(text)
    }
}

/// Rules applied to every response body.
///
/// # Examples
///
/// ```
/// use apkrelay_publisher::artefact::probe::{BodyProbe, BodyVerdict, NotReadyReason};
///
/// let probe = BodyProbe::new("Not Found", 1, false);
/// assert_eq!(probe.classify(b"\x00\x01"), BodyVerdict::Valid);
/// assert_eq!(
///     probe.classify(b"Not Found"),
///     BodyVerdict::NotReady(NotReadyReason::MarkerPresent)
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyProbe {
    marker: Vec<u8>,
    min_bytes: u64,
    require_archive_magic: bool,
}

impl BodyProbe {
    /// Build a probe from explicit rules.
    #[must_use]
    pub fn new(marker: &str, min_bytes: u64, require_archive_magic: bool) -> Self {
        Self {
            marker: marker.as_bytes().to_vec(),
            min_bytes,
            require_archive_magic,
        }
    }

    /// Build a probe from the store section of the configuration.
    #[must_use]
    pub fn from_config(store: &StoreConfig) -> Self {
        Self::new(
            &store.not_found_marker,
            store.min_artifact_bytes,
            store.require_archive_magic,
        )
    }

    /// Classify a complete response body.
    ///
    /// The marker check scans the whole body, so a marker embedded in an
    /// otherwise plausible payload is still rejected.
    #[must_use]
    pub fn classify(&self, body: &[u8]) -> BodyVerdict {
        if body.is_empty() {
            return BodyVerdict::NotReady(NotReadyReason::Empty);
        }
        if contains(body, &self.marker) {
            return BodyVerdict::NotReady(NotReadyReason::MarkerPresent);
        }
        if u64::try_from(body.len()).unwrap_or(u64::MAX) < self.min_bytes {
            return BodyVerdict::NotReady(NotReadyReason::TooSmall);
        }
        if self.require_archive_magic && !body.starts_with(ZIP_MAGIC) {
            return BodyVerdict::NotReady(NotReadyReason::NotAnArchive);
        }
        BodyVerdict::Valid
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

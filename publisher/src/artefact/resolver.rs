//! Selection of the authoritative artefact per variant.
//!
//! A working directory may hold both the signed and the unsigned build of a
//! variant. The signed build always wins; the unsigned file is reported as
//! superseded so that the caller can remove it. Resolution never touches
//! the file system beyond the optional [`list_candidates`] helper.

use super::naming::ArtefactName;
use super::reference::ArtifactRef;
use apkrelay::LogicalVariant;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::collections::BTreeMap;
use thiserror::Error;

/// The authoritative artefacts, one per variant.
pub type ArtifactSet = BTreeMap<LogicalVariant, ArtifactRef>;

/// Errors raised while resolving a listing.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Two signed candidates claim the same variant.
    #[error("two signed artefacts for {variant}: {first} and {second}")]
    DuplicateSigned {
        /// The contested variant.
        variant: LogicalVariant,
        /// The first candidate seen.
        first: Utf8PathBuf,
        /// The conflicting candidate.
        second: Utf8PathBuf,
    },

    /// Two unsigned candidates claim the same variant and no signed build
    /// exists to settle it.
    #[error("two unsigned artefacts for {variant}: {first} and {second}")]
    DuplicateUnsigned {
        /// The contested variant.
        variant: LogicalVariant,
        /// The first candidate seen.
        first: Utf8PathBuf,
        /// The conflicting candidate.
        second: Utf8PathBuf,
    },

    /// The working directory could not be listed.
    #[error("failed to list {path}: {source}")]
    Io {
        /// The directory being listed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result of resolving a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Authoritative artefacts keyed by variant.
    pub set: ArtifactSet,
    /// Unsigned files that lost to a signed counterpart.
    pub superseded: Vec<Utf8PathBuf>,
}

#[derive(Default)]
struct Candidates {
    signed: Option<ArtifactRef>,
    unsigned: Option<ArtifactRef>,
}

/// Decides which candidate files form the release.
///
/// # Examples
///
/// ```
/// use apkrelay::LogicalVariant;
/// use apkrelay_publisher::artefact::resolver::VariantResolver;
/// use camino::Utf8PathBuf;
///
/// let listing = vec![
///     Utf8PathBuf::from("out/foo-armeabi-v7a.apk"),
///     Utf8PathBuf::from("out/foo-armeabi-v7a-signed.apk"),
/// ];
/// let resolution = VariantResolver::new("apk").resolve(&listing).expect("resolves");
/// let chosen = &resolution.set[&LogicalVariant::ArmeabiV7a];
/// assert!(chosen.is_signed());
/// assert_eq!(resolution.superseded, vec![Utf8PathBuf::from("out/foo-armeabi-v7a.apk")]);
/// ```
#[derive(Debug, Clone)]
pub struct VariantResolver {
    extension: String,
}

impl VariantResolver {
    /// Create a resolver for artefacts with the given extension.
    #[must_use]
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Resolve a listing of candidate paths.
    ///
    /// Paths whose names do not follow the artefact convention are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DuplicateSigned`] or
    /// [`ResolveError::DuplicateUnsigned`] when a variant is ambiguous.
    pub fn resolve(&self, listing: &[Utf8PathBuf]) -> Result<Resolution, ResolveError> {
        let mut by_variant: BTreeMap<LogicalVariant, Candidates> = BTreeMap::new();

        for path in listing {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let name = match ArtefactName::parse(file_name, &self.extension) {
                Ok(name) => name,
                Err(err) => {
                    debug!("ignoring {path}: {err}");
                    continue;
                }
            };
            let reference = ArtifactRef::new(&name, path.clone());
            let slot = by_variant.entry(name.variant()).or_default();
            let existing = if name.is_signed() {
                &mut slot.signed
            } else {
                &mut slot.unsigned
            };
            if let Some(first) = existing.as_ref() {
                let (first, second) = (first.local_path().to_owned(), path.clone());
                let variant = name.variant();
                return Err(if name.is_signed() {
                    ResolveError::DuplicateSigned {
                        variant,
                        first,
                        second,
                    }
                } else {
                    ResolveError::DuplicateUnsigned {
                        variant,
                        first,
                        second,
                    }
                });
            }
            *existing = Some(reference);
        }

        let mut resolution = Resolution::default();
        for (variant, candidates) in by_variant {
            let chosen = match (candidates.signed, candidates.unsigned) {
                (Some(signed), Some(unsigned)) => {
                    resolution.superseded.push(unsigned.local_path().to_owned());
                    signed
                }
                (Some(only), None) | (None, Some(only)) => only,
                (None, None) => continue,
            };
            resolution.set.insert(variant, chosen);
        }
        resolution.superseded.sort();
        Ok(resolution)
    }
}

/// List the regular files directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`ResolveError::Io`] when the directory cannot be read.
pub fn list_candidates(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ResolveError> {
    let io_error = |source| ResolveError::Io {
        path: dir.to_owned(),
        source,
    };
    let mut listing = Vec::new();
    for entry in dir.read_dir_utf8().map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().map_err(io_error)?.is_file() {
            listing.push(entry.path().to_owned());
        }
    }
    listing.sort();
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn resolver() -> VariantResolver {
        VariantResolver::new("apk")
    }

    fn paths(names: &[&str]) -> Vec<Utf8PathBuf> {
        names
            .iter()
            .map(|name| Utf8PathBuf::from(format!("work/{name}")))
            .collect()
    }

    #[rstest]
    fn signed_wins_regardless_of_listing_order(resolver: VariantResolver) {
        let listing = paths(&["foo-armeabi-v7a-signed.apk", "foo-armeabi-v7a.apk"]);
        let resolution = resolver.resolve(&listing).expect("resolves");

        let chosen = resolution
            .set
            .get(&LogicalVariant::ArmeabiV7a)
            .expect("variant present");
        assert!(chosen.is_signed());
        assert_eq!(resolution.superseded, paths(&["foo-armeabi-v7a.apk"]));
    }

    #[rstest]
    fn unsigned_only_listing_resolves(resolver: VariantResolver) {
        let listing = paths(&["app-x86.apk", "app-x86_64.apk", "app-arm64-v8a.apk"]);
        let resolution = resolver.resolve(&listing).expect("resolves");

        assert_eq!(resolution.set.len(), 3);
        assert!(resolution.set.values().all(|r| !r.is_signed()));
        assert!(resolution.superseded.is_empty());
    }

    #[rstest]
    fn duplicate_signed_builds_are_rejected(resolver: VariantResolver) {
        let listing = paths(&["a-x86-signed.apk", "b-x86-signed.apk"]);
        let err = resolver.resolve(&listing).expect_err("ambiguous");
        assert!(matches!(
            err,
            ResolveError::DuplicateSigned {
                variant: LogicalVariant::X86,
                ..
            }
        ));
    }

    #[rstest]
    fn duplicate_unsigned_builds_are_rejected(resolver: VariantResolver) {
        let listing = paths(&["a-x86_64.apk", "b-x86_64.apk"]);
        let err = resolver.resolve(&listing).expect_err("ambiguous");
        assert!(matches!(err, ResolveError::DuplicateUnsigned { .. }));
    }

    #[rstest]
    fn non_artefacts_and_unknown_names_are_ignored(resolver: VariantResolver) {
        let listing = paths(&["SHA256SUMS", ".tmpAbC123", "app-mips.apk", "app-x86.apk"]);
        let resolution = resolver.resolve(&listing).expect("resolves");
        assert_eq!(
            resolution.set.keys().copied().collect::<Vec<_>>(),
            vec![LogicalVariant::X86]
        );
    }

    #[rstest]
    fn empty_listing_yields_an_empty_set(resolver: VariantResolver) {
        let resolution = resolver.resolve(&[]).expect("resolves");
        assert!(resolution.set.is_empty());
    }

    #[rstest]
    fn list_candidates_skips_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        std::fs::write(root.join("app-x86.apk"), b"x").expect("write");
        std::fs::create_dir(root.join("nested-x86_64.apk")).expect("mkdir");

        let listing = list_candidates(&root).expect("listing");
        assert_eq!(listing, vec![root.join("app-x86.apk")]);
    }
}

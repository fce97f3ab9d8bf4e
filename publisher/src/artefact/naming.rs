//! Artefact file naming convention.
//!
//! Release artefacts are named `<prefix>-<variant token>[-signed].<ext>`, for
//! example `app-arm64-v8a-signed.apk`. Classification is pure: it looks only
//! at the file name and never touches the file system.

use super::error::{ArtefactError, Result};
use apkrelay::LogicalVariant;
use std::fmt;

/// Suffix (before the extension) marking a signed artefact.
const SIGNED_SUFFIX: &str = "-signed";

/// A file name classified into its logical variant and signing state.
///
/// # Examples
///
/// ```
/// use apkrelay::LogicalVariant;
/// use apkrelay_publisher::artefact::naming::ArtefactName;
///
/// let name = ArtefactName::parse("foo-armeabi-v7a-signed.apk", "apk")
///     .expect("conventional name");
/// assert_eq!(name.variant(), LogicalVariant::ArmeabiV7a);
/// assert!(name.is_signed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtefactName {
    file_name: String,
    variant: LogicalVariant,
    signed: bool,
}

impl ArtefactName {
    /// Classify `file_name` against the naming convention.
    ///
    /// The extension comparison ignores ASCII case. The variant token must
    /// be dash-delimited; when several tokens could match, the longest wins
    /// so that `x86_64` is never mistaken for `x86`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::NotAFileName`] for values containing a path
    /// separator, [`ArtefactError::WrongExtension`] when the extension does
    /// not match, and [`ArtefactError::UnknownVariant`] when no variant token
    /// is present.
    pub fn parse(file_name: &str, extension: &str) -> Result<Self> {
        if file_name.contains(['/', '\\']) {
            return Err(ArtefactError::NotAFileName {
                name: file_name.to_owned(),
            });
        }
        let stem = strip_extension(file_name, extension).ok_or_else(|| {
            ArtefactError::WrongExtension {
                name: file_name.to_owned(),
                extension: extension.to_owned(),
            }
        })?;
        let (stem, signed) = match stem.strip_suffix(SIGNED_SUFFIX) {
            Some(unsigned_stem) => (unsigned_stem, true),
            None => (stem, false),
        };
        let variant = infer_variant(stem).ok_or_else(|| ArtefactError::UnknownVariant {
            name: file_name.to_owned(),
        })?;

        Ok(Self {
            file_name: file_name.to_owned(),
            variant,
            signed,
        })
    }

    /// The classified file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The logical variant encoded in the name.
    #[must_use]
    pub const fn variant(&self) -> LogicalVariant {
        self.variant
    }

    /// Whether the name carries the `-signed` marker.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signed
    }
}

impl fmt::Display for ArtefactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

fn strip_extension<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    let (stem, actual) = file_name.rsplit_once('.')?;
    (actual.eq_ignore_ascii_case(extension) && !stem.is_empty()).then_some(stem)
}

fn infer_variant(stem: &str) -> Option<LogicalVariant> {
    let ordered = LogicalVariant::by_token_length();
    ordered
        .iter()
        .copied()
        .find(|variant| {
            let token = variant.file_token();
            stem == token || stem.ends_with(&format!("-{token}"))
        })
        .or_else(|| {
            ordered
                .iter()
                .copied()
                .find(|variant| stem.contains(&format!("-{}-", variant.file_token())))
        })
}

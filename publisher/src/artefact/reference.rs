//! Locally stored artefacts.

use super::naming::ArtefactName;
use apkrelay::LogicalVariant;
use camino::{Utf8Path, Utf8PathBuf};

/// One artefact on local storage, classified by its file name.
///
/// References are never mutated in place; a re-fetch or a remote URL lookup
/// yields a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    variant: LogicalVariant,
    signed: bool,
    local_path: Utf8PathBuf,
    remote_url: Option<String>,
}

impl ArtifactRef {
    /// Build a reference from a classified name and the path it lives at.
    #[must_use]
    pub fn new(name: &ArtefactName, local_path: Utf8PathBuf) -> Self {
        Self {
            variant: name.variant(),
            signed: name.is_signed(),
            local_path,
            remote_url: None,
        }
    }

    /// Return a copy that records where the artefact was downloaded from.
    #[must_use]
    pub fn with_remote_url(self, remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: Some(remote_url.into()),
            ..self
        }
    }

    /// The logical variant.
    #[must_use]
    pub const fn variant(&self) -> LogicalVariant {
        self.variant
    }

    /// Whether the artefact is the signed build.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signed
    }

    /// Where the artefact is stored locally.
    #[must_use]
    pub fn local_path(&self) -> &Utf8Path {
        &self.local_path
    }

    /// Where the artefact was downloaded from, when known.
    #[must_use]
    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    /// The bare file name of the local copy.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.local_path.file_name().unwrap_or(self.local_path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_url_is_attached_without_touching_the_rest() {
        let name = ArtefactName::parse("app-x86-signed.apk", "apk").expect("valid name");
        let reference = ArtifactRef::new(&name, Utf8PathBuf::from("work/app-x86-signed.apk"));
        let located = reference
            .clone()
            .with_remote_url("https://builds.test/nightly/app-x86-signed.apk");

        assert_eq!(reference.remote_url(), None);
        assert_eq!(
            located.remote_url(),
            Some("https://builds.test/nightly/app-x86-signed.apk")
        );
        assert_eq!(located.file_name(), "app-x86-signed.apk");
        assert_eq!(located.variant(), LogicalVariant::X86);
        assert!(located.is_signed());
    }
}

//! Commit descriptor parsing.
//!
//! The descriptor is the JSON document the hosting service returns for a
//! commit:
//!
//! ```json
//! {
//!   "sha": "abcdef1234567",
//!   "html_url": "https://github.com/owner/repo/commit/abcdef1234567",
//!   "commit": { "message": "Fix crash", "author": { "name": "A", "email": "a@x.com" } }
//! }
//! ```
//!
//! Unknown fields are ignored; `html_url` is optional.

use super::MetadataError;
use super::commit_id::CommitId;
use camino::Utf8Path;
use serde::Deserialize;

/// Structured release information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRecord {
    /// Seven-character abbreviation of `full_id`.
    pub short_id: String,
    /// The full commit identifier.
    pub full_id: String,
    /// The commit message.
    pub message: String,
    /// Commit author's name.
    pub author_name: String,
    /// Commit author's email address.
    pub author_email: String,
    /// Web page for the commit, when the descriptor provides one.
    pub source_url: Option<String>,
}

#[derive(Deserialize)]
struct Descriptor {
    sha: Option<String>,
    html_url: Option<String>,
    commit: Option<CommitSection>,
}

#[derive(Deserialize)]
struct CommitSection {
    message: Option<String>,
    author: Option<AuthorSection>,
}

#[derive(Deserialize)]
struct AuthorSection {
    name: Option<String>,
    email: Option<String>,
}

/// Reads commit descriptors into [`ReleaseRecord`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseMetadataReader;

impl ReleaseMetadataReader {
    /// Read and parse the descriptor at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Unreadable`] when the file cannot be read and
    /// [`MetadataError::Malformed`] when its content is invalid.
    pub fn read(&self, path: &Utf8Path) -> Result<ReleaseRecord, MetadataError> {
        let json = std::fs::read_to_string(path).map_err(|source| MetadataError::Unreadable {
            path: path.to_owned(),
            source,
        })?;
        self.parse(&json)
    }

    /// Parse a descriptor from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Malformed`] for invalid JSON, a missing
    /// required field, or a commit id that is not hexadecimal or shorter
    /// than seven characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay_publisher::release::ReleaseMetadataReader;
    ///
    /// let record = ReleaseMetadataReader
    ///     .parse(r#"{"sha":"abcdef1234567","commit":{"message":"Fix crash",
    ///         "author":{"name":"A","email":"a@x.com"}}}"#)
    ///     .expect("valid descriptor");
    /// assert_eq!(record.short_id, "abcdef1");
    /// assert_eq!(record.source_url, None);
    /// ```
    pub fn parse(&self, json: &str) -> Result<ReleaseRecord, MetadataError> {
        let descriptor: Descriptor =
            serde_json::from_str(json).map_err(|err| MetadataError::Malformed {
                reason: err.to_string(),
            })?;

        let sha = required(descriptor.sha, "sha")?;
        let id = CommitId::try_from(sha.as_str())?;
        let commit = required(descriptor.commit, "commit")?;
        let message = required(commit.message, "commit.message")?;
        let author = required(commit.author, "commit.author")?;
        let author_name = required(author.name, "commit.author.name")?;
        let author_email = required(author.email, "commit.author.email")?;

        Ok(ReleaseRecord {
            short_id: id.short().to_owned(),
            full_id: id.as_str().to_owned(),
            message,
            author_name,
            author_email,
            source_url: descriptor.html_url.filter(|url| !url.trim().is_empty()),
        })
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, MetadataError> {
    value.ok_or_else(|| MetadataError::Malformed {
        reason: format!("missing field `{field}`"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DESCRIPTOR: &str = r#"{
        "sha": "abcdef1234567",
        "html_url": "https://example.test/commit/abcdef1234567",
        "node_id": "ignored",
        "commit": {
            "message": "Fix crash",
            "author": { "name": "A", "email": "a@x.com", "date": "2024-01-01T00:00:00Z" }
        }
    }"#;

    #[rstest]
    fn parses_a_full_descriptor() {
        let record = ReleaseMetadataReader.parse(DESCRIPTOR).expect("valid");
        assert_eq!(
            record,
            ReleaseRecord {
                short_id: "abcdef1".to_owned(),
                full_id: "abcdef1234567".to_owned(),
                message: "Fix crash".to_owned(),
                author_name: "A".to_owned(),
                author_email: "a@x.com".to_owned(),
                source_url: Some("https://example.test/commit/abcdef1234567".to_owned()),
            }
        );
    }

    #[rstest]
    #[case::not_json("not json")]
    #[case::missing_sha(r#"{"commit":{"message":"m","author":{"name":"A","email":"e"}}}"#)]
    #[case::short_sha(r#"{"sha":"abc","commit":{"message":"m","author":{"name":"A","email":"e"}}}"#)]
    #[case::missing_author(r#"{"sha":"abcdef1","commit":{"message":"m"}}"#)]
    #[case::missing_email(r#"{"sha":"abcdef1","commit":{"message":"m","author":{"name":"A"}}}"#)]
    #[case::wrong_type(r#"{"sha":1234567}"#)]
    fn malformed_descriptors_are_rejected(#[case] json: &str) {
        assert!(matches!(
            ReleaseMetadataReader.parse(json),
            Err(MetadataError::Malformed { .. })
        ));
    }

    #[rstest]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8Path::from_path(dir.path())
            .expect("utf-8 path")
            .join("commit.json");
        assert!(matches!(
            ReleaseMetadataReader.read(&path),
            Err(MetadataError::Unreadable { .. })
        ));
    }
}

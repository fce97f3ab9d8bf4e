//! Commit identifier newtype.
//!
//! Validates that the value is a hexadecimal git object name of 7 to 64
//! characters, covering abbreviated names as well as full SHA-1 and SHA-256
//! object names. Values are normalised to lowercase.

use super::MetadataError;
use std::fmt;

/// Length of the abbreviated form used in captions and commit messages.
pub const SHORT_LEN: usize = 7;

/// Longest accepted object name (SHA-256 repositories).
const MAX_LEN: usize = 64;

/// A validated commit identifier.
///
/// # Examples
///
/// ```
/// use apkrelay_publisher::release::commit_id::CommitId;
///
/// let id = CommitId::try_from("ABCDEF1234567").expect("valid id");
/// assert_eq!(id.as_str(), "abcdef1234567");
/// assert_eq!(id.short(), "abcdef1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(String);

impl CommitId {
    /// Return the full identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the first seven characters.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_LEN).unwrap_or(&self.0)
    }
}

impl TryFrom<&str> for CommitId {
    type Error = MetadataError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.len() < SHORT_LEN || value.len() > MAX_LEN {
            return Err(MetadataError::Malformed {
                reason: format!(
                    "commit id must be {SHORT_LEN} to {MAX_LEN} characters, got {}",
                    value.len()
                ),
            });
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(MetadataError::Malformed {
                reason: format!("commit id contains non-hex character '{bad}'"),
            });
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abcdef1", "abcdef1")]
    #[case("abcdef1234567", "abcdef1")]
    #[case(&"a".repeat(40), "aaaaaaa")]
    #[case(&"0".repeat(64), "0000000")]
    fn accepts_abbreviated_and_full_ids(#[case] value: &str, #[case] short: &str) {
        let id = CommitId::try_from(value).expect("valid id");
        assert_eq!(id.short(), short);
    }

    #[rstest]
    #[case("")]
    #[case("abc123")]
    #[case("abc123g")]
    #[case(&"a".repeat(65))]
    fn rejects_malformed_ids(#[case] value: &str) {
        assert!(matches!(
            CommitId::try_from(value),
            Err(MetadataError::Malformed { .. })
        ));
    }
}

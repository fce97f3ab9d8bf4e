//! SHA-256 digests of artefact content, computed by streaming through `sha2`.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;

/// Read buffer size used while hashing.
const CHUNK_LEN: usize = 64 * 1024;

/// A lowercase hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use apkrelay_publisher::artefact::sha256_digest::Sha256Digest;
///
/// let digest = Sha256Digest::of_bytes(b"abc");
/// assert_eq!(
///     digest.as_str(),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Hash an in-memory buffer.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Hash everything `reader` yields, in fixed-size chunks.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the reader.
    pub fn of_reader(reader: &mut dyn Read) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_LEN];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(buffer.get(..bytes_read).unwrap_or_default());
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_input_hashes_to_the_known_digest() {
        assert_eq!(Sha256Digest::of_bytes(b"").as_str(), EMPTY_SHA256);
    }

    #[test]
    fn reader_and_buffer_agree_across_chunk_boundaries() {
        let payload = vec![7u8; CHUNK_LEN * 2 + 17];
        let streamed = Sha256Digest::of_reader(&mut payload.as_slice()).expect("in-memory read");
        assert_eq!(streamed, Sha256Digest::of_bytes(&payload));
    }
}

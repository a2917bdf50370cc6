//! Content hashing helpers.
//!
//! Fingerprints and checksums are MD5 over the hex-encoded payload text: the
//! 32-char digest is what the path-length overhead in
//! [`ChunkPolicy`](super::chunking::ChunkPolicy) is sized for. Key material is
//! derived with SHA-256.

use md5::Md5;
use sha2::{Digest, Sha256};

/// MD5 of a string's UTF-8 bytes. Returns lowercase hex (32 chars).
pub fn checksum(data: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Incremental MD5 over a sequence of string slices.
///
/// Lets the receiver verify a reassembled payload chunk by chunk without
/// first building the concatenated string.
pub struct StreamingChecksum {
    hasher: Md5,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self { hasher: Md5::new() }
    }

    pub fn update(&mut self, part: &str) {
        self.hasher.update(part.as_bytes());
    }

    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Default for StreamingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a 256-bit key from an arbitrary key string.
pub fn derive_key(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_known_vectors() {
        assert_eq!(checksum(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(checksum("hi"), "49f68a5c8493ec2c0bf489821c21fc3b");
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut s = StreamingChecksum::new();
        s.update("ab");
        s.update("");
        s.update("cdef");
        assert_eq!(s.finalize(), checksum("abcdef"));
    }

    #[test]
    fn derive_key_is_sha256() {
        let key = derive_key("abc");
        assert_eq!(
            hex::encode(key),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

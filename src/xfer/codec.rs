//! Whole-payload authenticated encryption.
//!
//! Wire format of an encoded payload (then hex-encoded):
//!
//! ```text
//! +-----------+---------------------+---------+
//! | nonce(12) | ciphertext (len(m)) | tag(16) |
//! +-----------+---------------------+---------+
//! ```
//!
//! The AES-256-GCM key is SHA-256 of the shared key string. Every `encode`
//! draws a fresh random nonce, so encoding the same bytes twice yields
//! different output; decoding is deterministic.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use super::hasher;

/// Size of the GCM nonce prefix in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("ciphertext too short: {len} bytes (need at least {min})")]
    TooShort { len: usize, min: usize },

    #[error("authentication failed (wrong key or tampered payload)")]
    Authentication,

    #[error("encryption failed")]
    Encryption,
}

/// AES-256-GCM codec bound to one key string.
#[derive(Clone)]
pub struct ContentCodec {
    cipher: Aes256Gcm,
}

impl ContentCodec {
    pub fn new(key: &str) -> Self {
        let key = hasher::derive_key(key);
        Self {
            cipher: Aes256Gcm::new(&Key::<Aes256Gcm>::from(key)),
        }
    }

    /// Encrypt `plaintext` and return `hex(nonce || ciphertext || tag)`.
    pub fn encode(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let data = hex::decode(encoded)?;
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::TooShort {
                len: data.len(),
                min: NONCE_SIZE,
            });
        }
        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Authentication)
    }
}

impl std::fmt::Debug for ContentCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCodec").finish_non_exhaustive()
    }
}

/// One-shot encode with a key string.
pub fn encode(plaintext: &[u8], key: &str) -> Result<String, CryptoError> {
    ContentCodec::new(key).encode(plaintext)
}

/// One-shot decode with a key string.
pub fn decode(encoded: &str, key: &str) -> Result<Vec<u8>, CryptoError> {
    ContentCodec::new(key).decode(encoded)
}

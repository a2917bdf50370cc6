//! Error types for the receiving and sending sides.

use thiserror::Error;

use super::codec::CryptoError;

/// Receiver-side failure for one protocol request.
///
/// None of these modify the transfer store: a rejected chunk or a premature
/// `complete` leaves the record pending for a later retry.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0}")]
    Validation(String),

    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error("Missing chunks: {received}/{total} received")]
    Incomplete { received: usize, total: u32 },

    #[error("{what} checksum verification failed: expected {expected}, got {actual}")]
    Integrity {
        what: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Error decrypting data: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_REQUEST",
            Self::NotFound(_) => "TRANSFER_NOT_FOUND",
            Self::Incomplete { .. } => "INCOMPLETE",
            Self::Integrity { .. } => "HASH_MISMATCH",
            Self::Crypto(_) => "DECRYPT_FAILED",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

/// Network-level failure of a single request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("connection failed: {0}")]
    Connection(String),
}

/// Why a send run stopped before finishing.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("encryption failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("request path length ({len}) exceeds maximum allowed length ({max})")]
    PathTooLong { len: usize, max: usize },

    #[error("failed to initialize transfer: {0}")]
    Init(String),

    #[error("receiver rejected {stage} (HTTP {status}): {message}")]
    Rejected {
        stage: String,
        status: u16,
        message: String,
    },

    #[error("chunk {index} failed after {attempts} attempts: {reason}")]
    ChunkFailed {
        index: usize,
        attempts: u32,
        reason: String,
    },

    #[error("cancelled")]
    Cancelled,
}

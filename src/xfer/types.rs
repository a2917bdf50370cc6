//! Plain data types shared across the transfer modules.
//!
//! Nothing here knows about HTTP or axum; the router and the sender adapt
//! these to their transport.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Server-side record of one in-flight transfer, keyed by fingerprint.
///
/// Owned by [`TransferStore`](super::store::TransferStore); handlers only
/// touch it under the store's lock.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: String,
    pub filename: Option<String>,
    pub total_chunks: u32,
    /// Declared length of the encoded payload in characters.
    pub file_size: u64,
    pub chunks: HashMap<u32, String>,
    pub created: Instant,
    pub last_updated: Instant,
    /// Set once the reassembled payload has been verified and persisted.
    pub checksum: Option<String>,
    /// Assigned by the store on insert. A re-initialized record never shares
    /// the generation of the one it replaced.
    pub generation: u64,
}

impl Transfer {
    pub fn new(id: String, filename: Option<String>, total_chunks: u32, file_size: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            filename,
            total_chunks,
            file_size,
            chunks: HashMap::with_capacity(total_chunks.min(4096) as usize),
            created: now,
            last_updated: now,
            checksum: None,
            generation: 0,
        }
    }

    pub fn received(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.checksum.is_some()
    }

    /// Indices in `[0, total_chunks)` not yet received.
    pub fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.chunks.contains_key(i))
            .collect()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_updated.elapsed()
    }

    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            received: self.received(),
            total_chunks: self.total_chunks,
            file_size: self.file_size,
            finalized: self.is_finalized(),
            idle_secs: self.idle_for().as_secs(),
        }
    }
}

/// Lightweight view of a transfer for logs and the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSummary {
    pub id: String,
    pub filename: Option<String>,
    pub received: usize,
    pub total_chunks: u32,
    pub file_size: u64,
    pub finalized: bool,
    pub idle_secs: u64,
}

/// What to do when `init` names a fingerprint that already has a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateInit {
    /// Keep received chunks when the declared shape matches, else reset.
    #[default]
    Resume,
    /// Always start over with an empty chunk map.
    Reset,
    /// Refuse the second init.
    Reject,
}

/// Sender lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    SendingChunks,
    Completing,
    Done,
    Aborted,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::SendingChunks => "sending_chunks",
            Phase::Completing => "completing",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        }
    }
}

/// Progress observation emitted by the sender after every attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub phase: Phase,
    /// 1-based index of the chunk being sent (0 before the first chunk).
    pub current: usize,
    pub total: usize,
    pub attempt: u32,
    pub succeeded: bool,
    pub elapsed: Duration,
}

/// Result of a send run that got past the chunk phase.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub fingerprint: String,
    pub filename: Option<String>,
    pub total_chunks: usize,
    pub chunk_size: usize,
    pub payload_len: usize,
    /// False when the `complete` request failed; chunks were still delivered.
    pub finalized: bool,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_gaps_in_order() {
        let mut t = Transfer::new("id".into(), None, 5, 10);
        t.chunks.insert(0, "a".into());
        t.chunks.insert(3, "b".into());
        assert_eq!(t.missing(), vec![1, 2, 4]);
        assert_eq!(t.received(), 2);
        assert!(!t.is_finalized());
    }

    #[test]
    fn duplicate_init_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrap {
            policy: DuplicateInit,
        }
        let w: Wrap = toml::from_str("policy = \"reject\"").unwrap();
        assert_eq!(w.policy, DuplicateInit::Reject);
    }
}

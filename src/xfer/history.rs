//! Bounded log of finished transfers.
//!
//! Finalized records leave the store (immediately or at the next sweep), so
//! this ring buffer is what still answers "what has arrived?" afterwards.
//! Each entry gets a monotonic `seq`; the oldest entry is dropped when the
//! buffer is full.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRecord {
    pub seq: u64,
    pub id: String,
    pub filename: Option<String>,
    /// Size of the decrypted output in bytes.
    pub bytes: u64,
    pub output_path: String,
    /// Unix time in milliseconds.
    pub timestamp: u64,
    /// Time from init to finalization.
    pub elapsed_ms: u64,
}

pub struct CompletionLog {
    entries: RwLock<VecDeque<CompletionRecord>>,
    next_seq: AtomicU64,
    max_entries: usize,
}

impl CompletionLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries)),
            next_seq: AtomicU64::new(1),
            max_entries,
        }
    }

    /// Append a record and return its sequence number.
    pub async fn record(
        &self,
        id: &str,
        filename: Option<String>,
        bytes: u64,
        output_path: String,
        elapsed_ms: u64,
    ) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let entry = CompletionRecord {
            seq,
            id: id.to_string(),
            filename,
            bytes,
            output_path,
            timestamp,
            elapsed_ms,
        };

        if self.max_entries == 0 {
            return seq;
        }
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
        seq
    }

    /// Most recent `limit` entries, newest last.
    pub async fn recent(&self, limit: usize) -> Vec<CompletionRecord> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Total completions since startup, including ones no longer buffered.
    pub fn total(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed) - 1
    }
}

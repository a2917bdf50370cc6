//! In-memory transfer table.
//!
//! One coarse `RwLock` guards every record. Chunk writes, init, eviction and
//! finalization marking take the write lock; reassembly reads take the read
//! lock. Nothing here decrypts or touches the disk.
//!
//! Every inserted record gets a fresh generation number. Writes that follow
//! a lock-free stretch (marking a finalized transfer, dropping it afterwards)
//! name the generation they observed and do nothing if the record was
//! replaced in between.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use super::error::TransferError;
use super::types::{DuplicateInit, Transfer, TransferSummary};

/// How an `init` was applied to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    /// Existing record kept along with its `received` chunks.
    Resumed { received: usize },
    /// Existing record replaced by an empty one.
    Reset,
}

#[derive(Default)]
pub struct TransferStore {
    transfers: RwLock<HashMap<String, Transfer>>,
    next_generation: AtomicU64,
}

impl TransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(&self, transfer: &mut Transfer) {
        transfer.generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
    }

    // ─── Init ────────────────────────────────────────────────────────────────

    /// Register `transfer`, applying `policy` when its id is already known.
    pub async fn init(
        &self,
        mut transfer: Transfer,
        policy: DuplicateInit,
    ) -> Result<InitOutcome, TransferError> {
        let mut transfers = self.transfers.write().await;
        self.stamp(&mut transfer);

        let Some(existing) = transfers.get_mut(&transfer.id) else {
            transfers.insert(transfer.id.clone(), transfer);
            return Ok(InitOutcome::Created);
        };

        if existing.is_finalized() {
            transfers.insert(transfer.id.clone(), transfer);
            return Ok(InitOutcome::Reset);
        }

        match policy {
            DuplicateInit::Reject => Err(TransferError::validation(format!(
                "Transfer already initialized: {}",
                transfer.id
            ))),
            DuplicateInit::Resume
                if existing.total_chunks == transfer.total_chunks
                    && existing.file_size == transfer.file_size =>
            {
                if transfer.filename.is_some() {
                    existing.filename = transfer.filename;
                }
                existing.last_updated = Instant::now();
                Ok(InitOutcome::Resumed {
                    received: existing.received(),
                })
            }
            DuplicateInit::Resume | DuplicateInit::Reset => {
                transfers.insert(transfer.id.clone(), transfer);
                Ok(InitOutcome::Reset)
            }
        }
    }

    /// Insert or replace a record unconditionally.
    pub async fn put(&self, mut transfer: Transfer) {
        self.stamp(&mut transfer);
        self.transfers
            .write()
            .await
            .insert(transfer.id.clone(), transfer);
    }

    // ─── Chunks ──────────────────────────────────────────────────────────────

    /// Store one chunk and refresh the activity timestamp. Returns the number
    /// of distinct chunks now held. A repeated index overwrites.
    pub async fn set_chunk(
        &self,
        id: &str,
        index: u32,
        payload: String,
    ) -> Result<usize, TransferError> {
        let mut transfers = self.transfers.write().await;
        let transfer = transfers
            .get_mut(id)
            .ok_or_else(|| TransferError::NotFound(id.to_string()))?;

        if transfer.is_finalized() {
            return Err(TransferError::validation(format!(
                "Transfer already finalized: {id}"
            )));
        }
        if index >= transfer.total_chunks {
            return Err(TransferError::validation(format!(
                "Chunk index {index} out of range (total {})",
                transfer.total_chunks
            )));
        }

        transfer.chunks.insert(index, payload);
        transfer.last_updated = Instant::now();
        debug!(
            transfer_id = %id,
            index,
            received = transfer.received(),
            total = transfer.total_chunks,
            "Chunk stored"
        );
        Ok(transfer.received())
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    /// Clone of one record.
    pub async fn get(&self, id: &str) -> Option<Transfer> {
        self.transfers.read().await.get(id).cloned()
    }

    /// Run `f` on a record under the read lock.
    pub async fn with<R>(
        &self,
        id: &str,
        f: impl FnOnce(&Transfer) -> R,
    ) -> Result<R, TransferError> {
        let transfers = self.transfers.read().await;
        transfers
            .get(id)
            .map(f)
            .ok_or_else(|| TransferError::NotFound(id.to_string()))
    }

    pub async fn for_each(&self, mut f: impl FnMut(&Transfer)) {
        for transfer in self.transfers.read().await.values() {
            f(transfer);
        }
    }

    pub async fn summaries(&self) -> Vec<TransferSummary> {
        let transfers = self.transfers.read().await;
        let mut out: Vec<_> = transfers.values().map(Transfer::summary).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub async fn len(&self) -> usize {
        self.transfers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transfers.read().await.is_empty()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Record the verified content checksum on the `generation` that was
    /// reassembled. Returns false if that record was evicted or replaced in
    /// the meantime.
    pub async fn mark_finalized(&self, id: &str, generation: u64, checksum: &str) -> bool {
        let mut transfers = self.transfers.write().await;
        match transfers.get_mut(id) {
            Some(transfer) if transfer.generation == generation => {
                transfer.checksum = Some(checksum.to_string());
                transfer.last_updated = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Remove the record only if it is still `generation`.
    pub async fn delete(&self, id: &str, generation: u64) -> Option<Transfer> {
        let mut transfers = self.transfers.write().await;
        if transfers.get(id)?.generation != generation {
            return None;
        }
        transfers.remove(id)
    }

    /// Remove every record matching `predicate` and return them.
    pub async fn evict_where(&self, mut predicate: impl FnMut(&Transfer) -> bool) -> Vec<Transfer> {
        let mut transfers = self.transfers.write().await;
        let ids: Vec<String> = transfers
            .iter()
            .filter(|(_, t)| predicate(t))
            .map(|(id, _)| id.clone())
            .collect();

        let removed: Vec<Transfer> = ids
            .iter()
            .filter_map(|id| transfers.remove(id))
            .collect();

        if !removed.is_empty() {
            info!(count = removed.len(), remaining = transfers.len(), "Evicted transfers");
        }
        removed
    }
}

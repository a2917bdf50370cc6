//! Receiver-side transfer lifecycle: init, chunk, complete.
//!
//! The manager validates each request against the store and delegates
//! finalization to the [`Reassembler`]. A rejected request never changes the
//! store, so senders can retry anything.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::TransferError;
use super::hasher;
use super::history::{CompletionLog, CompletionRecord};
use super::reassembly::{Finalized, Reassembler};
use super::request::Request;
use super::store::{InitOutcome, TransferStore};
use super::types::{DuplicateInit, Transfer, TransferSummary};

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub duplicate_init: DuplicateInit,
    /// Keep finalized records until the sweeper evicts them.
    pub retain_finalized: bool,
    pub history_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            duplicate_init: DuplicateInit::Resume,
            retain_finalized: true,
            history_size: 100,
        }
    }
}

/// Owns the transfer table and the completion history.
pub struct TransferManager {
    store: Arc<TransferStore>,
    reassembler: Reassembler,
    history: CompletionLog,
    config: ManagerConfig,
}

impl TransferManager {
    pub fn new(store: Arc<TransferStore>, reassembler: Reassembler, config: ManagerConfig) -> Self {
        Self {
            store,
            reassembler,
            history: CompletionLog::new(config.history_size),
            config,
        }
    }

    pub fn store(&self) -> &Arc<TransferStore> {
        &self.store
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    /// Apply one parsed request.
    pub async fn handle(&self, request: Request) -> Result<(), TransferError> {
        match request {
            Request::Init {
                id,
                total_chunks,
                file_size,
                filename,
            } => self.handle_init(id, total_chunks, file_size, filename).await,
            Request::Chunk {
                id,
                index,
                checksum,
                payload,
            } => self.handle_chunk(&id, index, &checksum, payload).await,
            Request::Complete { id, checksum } => {
                self.handle_complete(&id, &checksum).await.map(|_| ())
            }
        }
    }

    // ─── Init ────────────────────────────────────────────────────────────────

    pub async fn handle_init(
        &self,
        id: String,
        total_chunks: u32,
        file_size: u64,
        filename: Option<String>,
    ) -> Result<(), TransferError> {
        if total_chunks == 0 {
            return Err(TransferError::validation("Invalid total chunks"));
        }

        let transfer = Transfer::new(id.clone(), filename.clone(), total_chunks, file_size);
        let outcome = self
            .store
            .init(transfer, self.config.duplicate_init)
            .await?;

        match outcome {
            InitOutcome::Created | InitOutcome::Reset => info!(
                transfer_id = %id,
                filename = filename.as_deref().unwrap_or("-"),
                total_chunks,
                file_size,
                reset = outcome == InitOutcome::Reset,
                "Transfer initialized"
            ),
            InitOutcome::Resumed { received } => info!(
                transfer_id = %id,
                received,
                total_chunks,
                "Transfer resumed"
            ),
        }
        Ok(())
    }

    // ─── Chunk ───────────────────────────────────────────────────────────────

    /// Verify the chunk checksum, then store it. A bad checksum is rejected
    /// before the transfer is even looked up.
    pub async fn handle_chunk(
        &self,
        id: &str,
        index: u32,
        expected: &str,
        payload: String,
    ) -> Result<(), TransferError> {
        let actual = hasher::checksum(&payload);
        if !actual.eq_ignore_ascii_case(expected) {
            warn!(transfer_id = %id, index, "Chunk checksum mismatch");
            return Err(TransferError::Integrity {
                what: "chunk",
                expected: expected.to_string(),
                actual,
            });
        }

        let received = self.store.set_chunk(id, index, payload).await?;
        debug!(transfer_id = %id, index, received, "Chunk accepted");
        Ok(())
    }

    // ─── Complete ────────────────────────────────────────────────────────────

    pub async fn handle_complete(
        &self,
        id: &str,
        checksum: &str,
    ) -> Result<Finalized, TransferError> {
        let finalized = self.reassembler.finalize(&self.store, id, checksum).await?;
        if finalized.already_finalized {
            return Ok(finalized);
        }

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = finalized.elapsed.as_millis() as u64;
        self.history
            .record(
                id,
                finalized.filename.clone(),
                finalized.bytes,
                finalized.path.to_string_lossy().into_owned(),
                elapsed_ms,
            )
            .await;

        if !self.config.retain_finalized {
            self.store.delete(id, finalized.generation).await;
        }

        info!(
            transfer_id = %id,
            bytes = finalized.bytes,
            elapsed_ms,
            "Transfer complete"
        );
        Ok(finalized)
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub async fn summaries(&self) -> Vec<TransferSummary> {
        self.store.summaries().await
    }

    /// Records still awaiting chunks or `complete`.
    pub async fn active_count(&self) -> usize {
        let mut active = 0;
        self.store
            .for_each(|t| {
                if !t.is_finalized() {
                    active += 1;
                }
            })
            .await;
        active
    }

    pub async fn recent_completions(&self, limit: usize) -> Vec<CompletionRecord> {
        self.history.recent(limit).await
    }

    pub fn completed_total(&self) -> u64 {
        self.history.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xfer::chunking;
    use crate::xfer::codec::ContentCodec;
    use crate::xfer::hasher::checksum;

    fn manager(dir: &std::path::Path, config: ManagerConfig) -> TransferManager {
        TransferManager::new(
            Arc::new(TransferStore::new()),
            Reassembler::new(dir, ContentCodec::new("k")),
            config,
        )
    }

    #[tokio::test]
    async fn full_lifecycle_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ManagerConfig::default());

        let payload = ContentCodec::new("k").encode(b"hello there").unwrap();
        let id = checksum(&payload);
        let chunks = chunking::split(&payload, 9);

        m.handle_init(
            id.clone(),
            chunks.len() as u32,
            payload.len() as u64,
            Some("greeting.txt".into()),
        )
        .await
        .unwrap();
        for (i, c) in chunks.iter().enumerate().rev() {
            m.handle_chunk(&id, i as u32, &checksum(c), c.clone())
                .await
                .unwrap();
        }
        let done = m.handle_complete(&id, &checksum(&payload)).await.unwrap();

        assert_eq!(std::fs::read(done.path).unwrap(), b"hello there");
        assert_eq!(m.completed_total(), 1);
        assert_eq!(m.active_count().await, 0);
        assert_eq!(m.summaries().await.len(), 1);
        assert_eq!(m.recent_completions(5).await[0].bytes, 11);
    }

    #[tokio::test]
    async fn tampered_chunk_rejected_and_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ManagerConfig::default());
        m.handle_init("abc".into(), 2, 8, None).await.unwrap();

        let sum = checksum("aaaa");
        let err = m
            .handle_chunk("abc", 0, &sum, "aaab".into())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Integrity { what: "chunk", .. }));
        assert_eq!(m.store().get("abc").await.unwrap().received(), 0);
    }

    #[tokio::test]
    async fn bad_checksum_wins_over_unknown_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ManagerConfig::default());
        let err = m
            .handle_chunk("nope", 0, "00", "aa".into())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "HASH_MISMATCH");

        let err = m
            .handle_chunk("nope", 0, &checksum("aa"), "aa".into())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TRANSFER_NOT_FOUND");
    }

    #[tokio::test]
    async fn zero_chunks_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ManagerConfig::default());
        let err = m.handle_init("abc".into(), 0, 0, None).await.unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
        assert!(m.store().is_empty().await);
    }

    #[tokio::test]
    async fn finalized_record_dropped_when_not_retained() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(
            dir.path(),
            ManagerConfig {
                retain_finalized: false,
                ..ManagerConfig::default()
            },
        );

        let payload = ContentCodec::new("k").encode(b"x").unwrap();
        let id = checksum(&payload);
        m.handle(Request::Init {
            id: id.clone(),
            total_chunks: 1,
            file_size: payload.len() as u64,
            filename: None,
        })
        .await
        .unwrap();
        m.handle(Request::Chunk {
            id: id.clone(),
            index: 0,
            checksum: checksum(&payload),
            payload: payload.clone(),
        })
        .await
        .unwrap();
        m.handle(Request::Complete {
            id: id.clone(),
            checksum: checksum(&payload),
        })
        .await
        .unwrap();

        assert!(m.store().get(&id).await.is_none());
        assert!(dir.path().join(format!("{id}.bin")).exists());
        assert_eq!(m.completed_total(), 1);
    }
}

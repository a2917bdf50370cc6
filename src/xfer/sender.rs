//! Sending side: encrypt, split, and push a payload one request at a time.
//!
//! ```text
//! Init ──> SendingChunks ──> Completing ──> Done
//!              │
//!              └──> Aborted (retry budget exhausted, 404, cancelled)
//! ```
//!
//! Exactly one request is in flight at any time. Every wait and every
//! request races the cancellation token.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chunking::{self, ChunkPolicy};
use super::codec::ContentCodec;
use super::error::SendError;
use super::hasher;
use super::request::Request;
use super::transport::{Response, Transport};
use super::types::{Phase, Progress, SendOutcome};

/// Attempts per chunk and the linear backoff between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): `attempt × unit`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub policy: ChunkPolicy,
    pub retry: RetryPolicy,
    /// Pause between successive chunks.
    pub inter_chunk_delay: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            policy: ChunkPolicy::default(),
            retry: RetryPolicy::default(),
            inter_chunk_delay: Duration::from_millis(500),
        }
    }
}

pub struct Sender<T> {
    transport: T,
    codec: ContentCodec,
    config: SenderConfig,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<Progress>>,
}

/// Outcome of one request attempt, as far as the retry loop cares.
enum Attempt {
    Ok,
    Retry(String),
    Fatal(Response),
}

impl<T: Transport> Sender<T> {
    pub fn new(transport: T, codec: ContentCodec, config: SenderConfig) -> Self {
        Self {
            transport,
            codec,
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deliver a [`Progress`] after every attempt. Observations are dropped
    /// when the channel is full.
    #[must_use]
    pub fn with_progress(mut self, tx: mpsc::Sender<Progress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Read `path` and send it. `name` overrides the remote filename, which
    /// otherwise defaults to the file's base name.
    pub async fn send_file(
        &self,
        path: &Path,
        name: Option<String>,
    ) -> Result<SendOutcome, SendError> {
        let data = tokio::fs::read(path).await?;
        let filename = name.or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        });
        info!(path = %path.display(), bytes = data.len(), "Read input file");
        self.send_payload(&data, filename).await
    }

    pub async fn send_payload(
        &self,
        plaintext: &[u8],
        filename: Option<String>,
    ) -> Result<SendOutcome, SendError> {
        let started = Instant::now();
        let result = self.run(plaintext, filename, started).await;
        if let Err(e) = &result {
            self.emit(Phase::Aborted, 0, 0, 0, false, started);
            warn!(error = %e, "Transfer aborted");
        }
        result
    }

    async fn run(
        &self,
        plaintext: &[u8],
        filename: Option<String>,
        started: Instant,
    ) -> Result<SendOutcome, SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }

        // ─── Init ────────────────────────────────────────────────────────────

        let payload = self.codec.encode(plaintext)?;
        let fingerprint = hasher::checksum(&payload);
        let chunk_size = self.config.policy.chunk_size_for(payload.len());
        let chunks = chunking::split(&payload, chunk_size);
        let total = chunks.len();

        info!(
            transfer_id = %fingerprint,
            payload_len = payload.len(),
            chunk_size,
            total_chunks = total,
            "Initializing transfer"
        );

        let init = Request::Init {
            id: fingerprint.clone(),
            total_chunks: u32::try_from(total)
                .map_err(|_| SendError::Init(format!("too many chunks: {total}")))?,
            file_size: payload.len() as u64,
            filename: filename.clone(),
        };
        let target = self.checked_target(&init)?;
        let resp = self
            .cancellable(self.transport.get(&target))
            .await?
            .map_err(|e| SendError::Init(e.to_string()))?;
        self.emit(Phase::Init, 0, total, 1, resp.is_success(), started);
        if !resp.is_success() {
            return Err(rejected("init", resp));
        }

        // ─── Chunks ──────────────────────────────────────────────────────────

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.config.inter_chunk_delay.is_zero() {
                self.sleep(self.config.inter_chunk_delay).await?;
            }
            self.send_chunk(&fingerprint, index, chunk, total, started)
                .await?;
        }

        // ─── Complete ────────────────────────────────────────────────────────

        let complete = Request::Complete {
            id: fingerprint.clone(),
            checksum: hasher::checksum(&payload),
        };
        let target = self.checked_target(&complete)?;
        let finalized = match self.cancellable(self.transport.get(&target)).await? {
            Ok(resp) if resp.is_success() => true,
            Ok(resp) => {
                warn!(
                    transfer_id = %fingerprint,
                    status = resp.status,
                    body = %resp.body.trim(),
                    "Complete request rejected"
                );
                false
            }
            Err(e) => {
                warn!(transfer_id = %fingerprint, error = %e, "Complete request failed");
                false
            }
        };
        let phase = if finalized { Phase::Done } else { Phase::Completing };
        self.emit(phase, total, total, 1, finalized, started);

        let outcome = SendOutcome {
            fingerprint,
            filename,
            total_chunks: total,
            chunk_size,
            payload_len: payload.len(),
            finalized,
            elapsed: started.elapsed(),
        };
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        info!(
            transfer_id = %outcome.fingerprint,
            total_chunks = outcome.total_chunks,
            finalized,
            elapsed_ms,
            "Transfer finished"
        );
        Ok(outcome)
    }

    async fn send_chunk(
        &self,
        fingerprint: &str,
        index: usize,
        chunk: &str,
        total: usize,
        started: Instant,
    ) -> Result<(), SendError> {
        let request = Request::Chunk {
            id: fingerprint.to_string(),
            index: u32::try_from(index).unwrap_or(u32::MAX),
            checksum: hasher::checksum(chunk),
            payload: chunk.to_string(),
        };
        let target = self.checked_target(&request)?;
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let result = self.cancellable(self.transport.get(&target)).await?;
            let verdict = match result {
                Ok(resp) if resp.is_success() => Attempt::Ok,
                Ok(resp) if resp.status == 404 => Attempt::Fatal(resp),
                Ok(resp) => Attempt::Retry(format!("HTTP {}: {}", resp.status, resp.body.trim())),
                Err(e) => Attempt::Retry(e.to_string()),
            };

            let succeeded = matches!(verdict, Attempt::Ok);
            self.emit(Phase::SendingChunks, index + 1, total, attempt, succeeded, started);

            match verdict {
                Attempt::Ok => return Ok(()),
                Attempt::Fatal(resp) => return Err(rejected(&format!("chunk {index}"), resp)),
                Attempt::Retry(reason) => {
                    warn!(
                        transfer_id = %fingerprint,
                        index,
                        attempt,
                        max_attempts,
                        reason = %reason,
                        "Chunk attempt failed"
                    );
                    last_error = reason;
                    if attempt < max_attempts {
                        self.sleep(self.config.retry.delay_for_attempt(attempt))
                            .await?;
                    }
                }
            }
        }

        Err(SendError::ChunkFailed {
            index,
            attempts: max_attempts,
            reason: last_error,
        })
    }

    /// Render a request and enforce the path length limit.
    fn checked_target(&self, request: &Request) -> Result<String, SendError> {
        let target = request.to_path();
        let max = self.config.policy.max_request_length;
        if target.len() > max {
            return Err(SendError::PathTooLong {
                len: target.len(),
                max,
            });
        }
        Ok(target)
    }

    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, SendError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SendError::Cancelled),
            out = fut => Ok(out),
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<(), SendError> {
        self.cancellable(tokio::time::sleep(delay)).await
    }

    fn emit(
        &self,
        phase: Phase,
        current: usize,
        total: usize,
        attempt: u32,
        succeeded: bool,
        started: Instant,
    ) {
        let progress = Progress {
            phase,
            current,
            total,
            attempt,
            succeeded,
            elapsed: started.elapsed(),
        };
        debug!(
            phase = phase.as_str(),
            current,
            total,
            attempt,
            succeeded,
            "Progress"
        );
        if let Some(tx) = &self.progress {
            let _ = tx.try_send(progress);
        }
    }
}

fn rejected(stage: &str, resp: Response) -> SendError {
    SendError::Rejected {
        stage: stage.to_string(),
        status: resp.status,
        message: resp.body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::xfer::error::TransportError;
    use crate::xfer::manager::{ManagerConfig, TransferManager};
    use crate::xfer::reassembly::Reassembler;
    use crate::xfer::request::DEFAULT_PATH_SUFFIX;
    use crate::xfer::store::TransferStore;

    /// Answers from a queue, then 200 forever. Records every target.
    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<String>>,
        plan: Mutex<VecDeque<Result<u16, String>>>,
    }

    impl Scripted {
        fn with_plan(plan: Vec<Result<u16, String>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                plan: Mutex::new(plan.into()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Arc<Scripted> {
        async fn get(&self, target: &str) -> Result<Response, TransportError> {
            self.calls.lock().unwrap().push(target.to_string());
            let next = self.plan.lock().unwrap().pop_front().unwrap_or(Ok(200));
            match next {
                Ok(status) => Ok(Response {
                    status,
                    body: String::new(),
                }),
                Err(msg) => Err(TransportError::Connection(msg)),
            }
        }
    }

    /// Routes requests straight into a receiver in the same process.
    struct Loopback {
        manager: Arc<TransferManager>,
    }

    #[async_trait]
    impl Transport for Loopback {
        async fn get(&self, target: &str) -> Result<Response, TransportError> {
            let path = format!("/{target}{DEFAULT_PATH_SUFFIX}");
            let (status, body) =
                crate::routes::protocol::dispatch(&self.manager, &path, DEFAULT_PATH_SUFFIX).await;
            Ok(Response {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn small_chunks() -> SenderConfig {
        SenderConfig {
            policy: ChunkPolicy {
                bands: vec![chunking::SizeBand {
                    below: u64::from(u32::MAX),
                    size: 20,
                }],
                ..ChunkPolicy::default()
            },
            ..SenderConfig::default()
        }
    }

    /// Paused-clock sleeps land on millisecond ticks.
    fn assert_elapsed(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "elapsed {actual:?}, expected about {expected:?}"
        );
    }

    fn sender(t: &Arc<Scripted>, config: SenderConfig) -> Sender<Arc<Scripted>> {
        Sender::new(Arc::clone(t), ContentCodec::new("k"), config)
    }

    #[test]
    fn backoff_is_linear() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn sends_init_chunks_complete_in_order() {
        let t = Arc::new(Scripted::default());
        let outcome = sender(&t, small_chunks())
            .send_payload(b"hello", Some("h.txt".into()))
            .await
            .unwrap();

        // 5 bytes -> 12 nonce + 5 + 16 tag = 33 bytes -> 66 hex chars -> 4 chunks of 20.
        assert_eq!(outcome.payload_len, 66);
        assert_eq!(outcome.total_chunks, 4);
        assert!(outcome.finalized);

        let calls = t.calls();
        assert_eq!(calls.len(), 6);
        assert!(calls[0].starts_with(&format!("init/{}/4/66/h.txt", outcome.fingerprint)));
        for (i, call) in calls[1..5].iter().enumerate() {
            assert!(call.starts_with(&format!("chunk/{}/{i}/", outcome.fingerprint)));
        }
        assert!(calls[5].starts_with(&format!("complete/{}/", outcome.fingerprint)));

        // Three pacing gaps between four chunks.
        assert_elapsed(outcome.elapsed, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_retried_with_linear_backoff() {
        let t = Arc::new(Scripted::with_plan(vec![
            Ok(200),
            Err("reset".into()),
            Ok(500),
            Ok(200),
        ]));
        let config = SenderConfig {
            inter_chunk_delay: Duration::ZERO,
            ..SenderConfig::default()
        };
        let outcome = sender(&t, config).send_payload(b"x", None).await.unwrap();

        assert_eq!(outcome.total_chunks, 1);
        assert_eq!(t.calls().len(), 5);
        // 1s after the first failure, 2s after the second.
        assert_elapsed(outcome.elapsed, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_aborts_before_complete() {
        let t = Arc::new(Scripted::with_plan(vec![
            Ok(200),
            Ok(500),
            Ok(500),
            Ok(500),
        ]));
        let err = sender(&t, SenderConfig::default())
            .send_payload(b"x", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SendError::ChunkFailed {
                index: 0,
                attempts: 3,
                ..
            }
        ));
        let calls = t.calls();
        assert_eq!(calls.len(), 4);
        assert!(!calls.iter().any(|c| c.starts_with("complete/")));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_aborts_without_retry() {
        let t = Arc::new(Scripted::with_plan(vec![Ok(200), Ok(404)]));
        let err = sender(&t, SenderConfig::default())
            .send_payload(b"x", None)
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::Rejected { status: 404, .. }));
        assert_eq!(t.calls().len(), 2);
    }

    #[tokio::test]
    async fn init_failure_is_fatal() {
        let t = Arc::new(Scripted::with_plan(vec![Err("refused".into())]));
        let err = sender(&t, SenderConfig::default())
            .send_payload(b"x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Init(_)));
        assert_eq!(t.calls().len(), 1);

        let t = Arc::new(Scripted::with_plan(vec![Ok(400)]));
        let err = sender(&t, SenderConfig::default())
            .send_payload(b"x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Rejected { status: 400, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_complete_is_reported_not_fatal() {
        let t = Arc::new(Scripted::with_plan(vec![Ok(200), Ok(200), Ok(500)]));
        let outcome = sender(&t, SenderConfig::default())
            .send_payload(b"x", None)
            .await
            .unwrap();
        assert!(!outcome.finalized);
        assert_eq!(t.calls().len(), 3);
    }

    #[tokio::test]
    async fn over_long_path_refused_before_sending() {
        let t = Arc::new(Scripted::default());
        let config = SenderConfig {
            policy: ChunkPolicy {
                max_request_length: 100,
                path_overhead: 0,
                ..ChunkPolicy::default()
            },
            ..SenderConfig::default()
        };
        let err = sender(&t, config)
            .send_payload(&[7u8; 64], None)
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::PathTooLong { max: 100, .. }));
        // Only init went out.
        assert_eq!(t.calls().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let t = Arc::new(Scripted::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sender(&t, SenderConfig::default())
            .with_cancel(cancel)
            .send_payload(b"x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Cancelled));
        assert!(t.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_backoff() {
        let t = Arc::new(Scripted::with_plan(vec![Ok(200), Ok(500), Ok(500)]));
        let cancel = CancellationToken::new();
        let s = sender(&t, SenderConfig::default()).with_cancel(cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        });
        let err = s.send_payload(b"x", None).await.unwrap_err();
        trigger.await.unwrap();

        assert!(matches!(err, SendError::Cancelled));
        assert_eq!(t.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reported_per_attempt() {
        let t = Arc::new(Scripted::with_plan(vec![Ok(200), Ok(503), Ok(200)]));
        let (tx, mut rx) = mpsc::channel(32);
        sender(&t, SenderConfig::default())
            .with_progress(tx)
            .send_payload(b"x", None)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push((p.phase, p.attempt, p.succeeded));
        }
        assert_eq!(
            seen,
            vec![
                (Phase::Init, 1, true),
                (Phase::SendingChunks, 1, false),
                (Phase::SendingChunks, 2, true),
                (Phase::Done, 1, true),
            ]
        );
    }

    #[tokio::test]
    async fn send_file_defaults_to_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, b"# notes").unwrap();

        let t = Arc::new(Scripted::default());
        let config = SenderConfig {
            inter_chunk_delay: Duration::ZERO,
            ..SenderConfig::default()
        };
        let outcome = sender(&t, config).send_file(&path, None).await.unwrap();
        assert_eq!(outcome.filename.as_deref(), Some("notes.md"));
        assert!(t.calls()[0].ends_with("/notes.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_through_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(TransferManager::new(
            Arc::new(TransferStore::new()),
            Reassembler::new(dir.path(), ContentCodec::new("k")),
            ManagerConfig::default(),
        ));

        let s = Sender::new(
            Loopback {
                manager: Arc::clone(&manager),
            },
            ContentCodec::new("k"),
            small_chunks(),
        );
        let outcome = s
            .send_payload(b"hi", Some("hi file.txt".into()))
            .await
            .unwrap();
        assert!(outcome.finalized);
        assert_eq!(
            std::fs::read(dir.path().join("hi file.txt")).unwrap(),
            b"hi"
        );

        // A second run with no name lands under the fingerprint.
        let big: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let outcome = s.send_payload(&big, None).await.unwrap();
        assert!(outcome.finalized);
        let written = dir.path().join(format!("{}.bin", outcome.fingerprint));
        assert_eq!(std::fs::read(written).unwrap(), big);
        assert_eq!(manager.completed_total(), 2);
    }
}

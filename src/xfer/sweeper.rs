//! Periodic eviction of idle transfers.
//!
//! Any record, finalized or not, whose `last_updated` is older than the
//! inactivity timeout is dropped. A sender that comes back after eviction
//! gets 404s and must start over with a fresh `init`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::store::TransferStore;

/// Evict idle records once. Returns the evicted ids.
pub async fn sweep_once(store: &TransferStore, inactivity_timeout: Duration) -> Vec<String> {
    let evicted = store
        .evict_where(|t| t.idle_for() > inactivity_timeout)
        .await;

    for t in &evicted {
        info!(
            transfer_id = %t.id,
            filename = t.filename.as_deref().unwrap_or("-"),
            received = t.received(),
            total_chunks = t.total_chunks,
            finalized = t.is_finalized(),
            idle_secs = t.idle_for().as_secs(),
            "Evicted idle transfer"
        );
    }
    evicted.into_iter().map(|t| t.id).collect()
}

/// Run [`sweep_once`] every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    store: Arc<TransferStore>,
    interval: Duration,
    inactivity_timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; nothing can be idle yet.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    sweep_once(&store, inactivity_timeout).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xfer::types::Transfer;

    fn transfer(id: &str) -> Transfer {
        Transfer::new(id.to_string(), None, 2, 8)
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_once_keeps_recent_activity() {
        let store = TransferStore::new();
        store.put(transfer("idle")).await;
        store.put(transfer("busy")).await;

        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        store.set_chunk("busy", 0, "aa".into()).await.unwrap();
        tokio::time::advance(Duration::from_secs(11 * 60)).await;

        let evicted = sweep_once(&store, Duration::from_secs(30 * 60)).await;
        assert_eq!(evicted, vec!["idle".to_string()]);
        assert!(store.get("busy").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn finalized_records_are_evicted_too() {
        let store = TransferStore::new();
        store.put(transfer("done")).await;
        let generation = store.get("done").await.unwrap().generation;
        assert!(store.mark_finalized("done", generation, "sum").await);

        tokio::time::advance(Duration::from_secs(31)).await;
        let evicted = sweep_once(&store, Duration::from_secs(30)).await;
        assert_eq!(evicted.len(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_evicts_and_stops() {
        let store = Arc::new(TransferStore::new());
        store.put(transfer("a")).await;

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            Arc::clone(&store),
            Duration::from_secs(300),
            Duration::from_secs(1000),
            cancel.clone(),
        );

        // Ticks at 300, 600 and 900 seconds find the record idle for less than 1000.
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(store.len().await, 1);

        // The tick at 1200 evicts it.
        tokio::time::sleep(Duration::from_secs(250)).await;
        assert!(store.is_empty().await);

        cancel.cancel();
        handle.await.unwrap();
    }
}

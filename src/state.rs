//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::xfer::codec::ContentCodec;
use crate::xfer::manager::TransferManager;
use crate::xfer::reassembly::Reassembler;
use crate::xfer::store::TransferStore;

/// Shared application state for the receiver.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Transfer table, reassembly and completion history.
    pub manager: Arc<TransferManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(TransferStore::new());
        let reassembler = Reassembler::new(
            config.output_dir(),
            ContentCodec::new(&config.transfer.encryption_key),
        );
        let manager = TransferManager::new(store, reassembler, config.manager_config());

        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            manager: Arc::new(manager),
        }
    }
}

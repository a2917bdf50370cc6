//! Health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/health`: liveness probe.
///
/// Returns status, uptime, version, the number of transfers still waiting
/// for chunks or `complete`, and the completion count since startup.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.start_time.elapsed().as_secs();
    let active = state.manager.active_count().await;
    let completed = state.manager.completed_total();
    let recent = state.manager.recent_completions(10).await;

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
        "active_transfers": active,
        "completed": completed,
        "recent": recent,
    }))
}

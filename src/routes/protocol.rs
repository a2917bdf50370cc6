//! Transfer protocol endpoint.
//!
//! Every protocol request is a plain `GET` whose path carries the operation,
//! so this handler is installed as the router's fallback and parses the raw
//! path itself. Responses are plain text: `OK` on success, the error message
//! otherwise.

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
};
use tracing::{debug, warn};

use crate::xfer::error::TransferError;
use crate::xfer::manager::TransferManager;
use crate::xfer::request::Request;
use crate::AppState;

/// Fallback handler for everything that is not `/api/health`.
pub async fn handle(State(state): State<AppState>, method: Method, uri: Uri) -> (StatusCode, String) {
    if method != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        );
    }
    dispatch(&state.manager, uri.path(), &state.config.transfer.path_suffix).await
}

/// Parse `path` and apply it to `manager`.
pub async fn dispatch(manager: &TransferManager, path: &str, suffix: &str) -> (StatusCode, String) {
    let request = match Request::parse(path, suffix) {
        Ok(request) => request,
        Err(e) => return transfer_error_to_http(None, &e),
    };

    let action = request.action();
    let id = request.id().to_string();
    debug!(transfer_id = %id, action, "Protocol request");

    match manager.handle(request).await {
        Ok(()) => (StatusCode::OK, "OK".to_string()),
        Err(e) => transfer_error_to_http(Some((&id, action)), &e),
    }
}

/// Map a `TransferError` to a status and plain-text body, logging it.
fn transfer_error_to_http(context: Option<(&str, &str)>, e: &TransferError) -> (StatusCode, String) {
    let status = match e {
        TransferError::NotFound(_) => StatusCode::NOT_FOUND,
        TransferError::Validation(_)
        | TransferError::Incomplete { .. }
        | TransferError::Integrity { .. } => StatusCode::BAD_REQUEST,
        TransferError::Crypto(_) | TransferError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let (id, action) = context.unwrap_or(("-", "-"));
    if status.is_server_error() {
        warn!(transfer_id = %id, action, code = e.code(), error = %e, "Request failed");
    } else {
        debug!(transfer_id = %id, action, code = e.code(), error = %e, "Request rejected");
    }
    (status, e.to_string())
}

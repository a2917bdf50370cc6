//! HTTP routes.
//!
//! [`health`] is the only named route; every other path goes to the
//! [`protocol`] fallback, since protocol requests are shaped to look like
//! arbitrary static lookups.

pub mod health;
pub mod protocol;

use axum::{routing::get, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the receiver's router.
pub fn app(state: AppState) -> Router {
    let max_concurrent = state.config.server.max_concurrent_requests;
    Router::new()
        .route("/api/health", get(health::health))
        .fallback(protocol::handle)
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::xfer::codec::ContentCodec;
    use crate::xfer::hasher::checksum;

    fn state(dir: &std::path::Path) -> AppState {
        let mut config = Config::default();
        config.server.output_dir = dir.to_string_lossy().into_owned();
        config.transfer.encryption_key = "k".into();
        AppState::new(config)
    }

    async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn protocol_paths_reach_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state(dir.path()));

        let payload = ContentCodec::new("k").encode(b"over http").unwrap();
        let id = checksum(&payload);
        let sum = checksum(&payload);

        let (status, body) = send(
            &app,
            "GET",
            &format!("/init/{id}/1/{}/my%20doc.txt/@v/v1.info", payload.len()),
        )
        .await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

        let (status, _) = send(
            &app,
            "GET",
            &format!("/chunk/{id}/0/{sum}/{payload}/@v/v1.info"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "GET", &format!("/complete/{id}/{sum}/@v/v1.info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            std::fs::read(dir.path().join("my doc.txt")).unwrap(),
            b"over http"
        );

        let (status, body) = send(&app, "GET", "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["completed"], 1);
        assert_eq!(health["active_transfers"], 0);
        assert_eq!(health["recent"][0]["filename"], "my doc.txt");
    }

    #[tokio::test]
    async fn non_get_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state(dir.path()));
        let (status, _) = send(&app, "POST", "/init/abc/1/2/f/@v/v1.info").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_transfer_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state(dir.path()));
        let (status, body) = send(&app, "GET", "/complete/abc/00/@v/v1.info").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("abc"));
    }
}

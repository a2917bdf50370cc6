//! How the sender reaches the receiver.
//!
//! [`Transport`] is the seam between the sender's control flow and the
//! network: production uses [`HttpTransport`], tests plug in scripted or
//! in-process implementations.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::error::TransportError;
use super::request::DEFAULT_PATH_SUFFIX;

/// Status and body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one GET for `target` (a request path without the disguise
    /// suffix, e.g. `init/...`).
    async fn get(&self, target: &str) -> Result<Response, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub path_suffix: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            path_suffix: DEFAULT_PATH_SUFFIX.to_string(),
        }
    }
}

/// `reqwest`-backed transport. Redirects are never followed: a redirect
/// to another scheme or host would leak the payload elsewhere.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    suffix: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, options: &HttpOptions) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            suffix: options.path_suffix.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a request target.
    pub fn url_for(&self, target: &str) -> String {
        format!(
            "{}/{}{}",
            self.base_url,
            target.trim_start_matches('/'),
            self.suffix
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, target: &str) -> Result<Response, TransportError> {
        let url = self.url_for(target);
        debug!(url = %url, "GET");

        let resp = self.http.get(&url).send().await.map_err(|e| {
            if e.is_connect() {
                TransportError::Connection(e.to_string())
            } else {
                TransportError::Request(e)
            }
        })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_target_and_suffix() {
        let t = HttpTransport::new("http://example.test:8080/", &HttpOptions::default()).unwrap();
        assert_eq!(t.base_url(), "http://example.test:8080");
        assert_eq!(
            t.url_for("/init/abc/1/2/f"),
            "http://example.test:8080/init/abc/1/2/f/@v/v1.info"
        );
    }

    #[test]
    fn success_range() {
        let ok = Response {
            status: 204,
            body: String::new(),
        };
        let redirect = Response {
            status: 302,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_error() {
        let options = HttpOptions {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(1),
            ..HttpOptions::default()
        };
        // Port 1 on loopback is essentially never listening.
        let t = HttpTransport::new("http://127.0.0.1:1", &options).unwrap();
        let err = t.get("complete/a/b").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connection(_) | TransportError::Request(_)
        ));
    }
}

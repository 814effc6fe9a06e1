//! The outbound round-trip seam used by the loaders.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use ethwire_core::error::TransportError;

/// One request/response exchange of opaque payload bytes.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    async fn fetch(&self, payload: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// `Fetch` over HTTP POST, backed by `reqwest`.
pub struct HttpFetcher {
    url: String,
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let url = url.into();
        let parsed = url::Url::parse(&url)
            .map_err(|e| TransportError::Config(format!("malformed URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::Config(format!(
                "unsupported scheme for HTTP transport: {}",
                parsed.scheme()
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { url, http })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        tracing::debug!(url = %self.url, bytes = payload.len(), "POST json-rpc payload");

        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        let err = HttpFetcher::new("not a url", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = HttpFetcher::new("ws://127.0.0.1:8546", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[test]
    fn accepts_http_url() {
        let f = HttpFetcher::new("http://127.0.0.1:8545", Duration::from_secs(1)).unwrap();
        assert_eq!(f.url(), "http://127.0.0.1:8545");
    }
}

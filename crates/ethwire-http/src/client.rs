//! HTTP JSON-RPC provider.
//!
//! Every call is a stateless POST. Concurrent calls are coalesced into wire
//! batches when the provider is built with a [`BatchConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use ethwire_core::codec::{self, Envelope, JsonRpcRequest, RpcParam, SubscriptionId};
use ethwire_core::config::{BatchConfig, HttpConfig};
use ethwire_core::error::TransportError;
use ethwire_core::provider::{NotificationSink, Provider};

use crate::batch::BatchLoader;
use crate::fetch::HttpFetcher;
use crate::loader::{Loader, SyncLoader};

/// Stateless provider over HTTP(S).
pub struct HttpProvider {
    url: String,
    loader: Arc<dyn Loader>,
}

impl HttpProvider {
    /// Create a provider for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpConfig) -> Result<Self, TransportError> {
        let url = url.into();
        let fetch = Arc::new(HttpFetcher::new(&url, config.request_timeout())?);
        let loader: Arc<dyn Loader> = match &config.batch {
            Some(batch) => Arc::new(BatchLoader::new(fetch, batch)?),
            None => Arc::new(SyncLoader::new(fetch)),
        };
        debug!(url = %url, batched = config.batch.is_some(), "http provider created");
        Ok(Self { url, loader })
    }

    /// Create with default configuration (no batching).
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpConfig::default())
    }

    /// Create a batching provider.
    ///
    /// `max_batch_size` of 0 means no size limit; `wait` must be at least
    /// one millisecond.
    pub fn with_batch(
        url: impl Into<String>,
        max_batch_size: i64,
        wait: Duration,
    ) -> Result<Self, TransportError> {
        let config = HttpConfig {
            batch: Some(BatchConfig::new(max_batch_size, wait)),
            ..HttpConfig::default()
        };
        Self::new(url, config)
    }

    /// Build on top of a custom loader.
    pub fn with_loader(url: impl Into<String>, loader: Arc<dyn Loader>) -> Self {
        Self {
            url: url.into(),
            loader,
        }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn request(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<Envelope, TransportError> {
        let req = JsonRpcRequest::with_new_id(method, params);
        let raw = self.loader.load(req).await?;
        codec::decode(&raw)
    }

    /// The response body exactly as the node sent it.
    async fn call_raw(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<Vec<u8>, TransportError> {
        self.loader
            .load(JsonRpcRequest::with_new_id(method, params))
            .await
    }

    async fn subscribe(
        &self,
        _sink: NotificationSink,
        _method: &str,
        _event: &str,
        _params: Vec<RpcParam>,
    ) -> Result<SubscriptionId, TransportError> {
        Err(TransportError::SubscriptionsUnsupported)
    }

    async fn unsubscribe(&self, _id: &SubscriptionId) -> Result<bool, TransportError> {
        Err(TransportError::SubscriptionsUnsupported)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::{EchoFetch, Mode};
    use ethwire_core::ProviderExt;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn calls_go_through_loader() {
        let fetch = Arc::new(EchoFetch::new(Mode::Echo));
        let provider = HttpProvider::with_loader("mock://node", Arc::new(SyncLoader::new(fetch.clone())));

        let balance: String = provider.call("eth_getBalance", vec![json!("0xabc")]).await.unwrap();

        assert_eq!(balance, "0xabc");
        let sent = &fetch.payloads()[0];
        assert_eq!(sent["method"], "eth_getBalance");
        assert_eq!(sent["jsonrpc"], "2.0");
        assert!(sent["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn raw_call_skips_decoding() {
        let fetch = Arc::new(EchoFetch::new(Mode::Garbage));
        let provider = HttpProvider::with_loader("mock://node", Arc::new(SyncLoader::new(fetch)));

        let raw = provider.call_raw("eth_blockNumber", vec![]).await.unwrap();
        assert_eq!(raw, b"<html>bad gateway</html>");

        let err = provider.request("eth_blockNumber", vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn subscriptions_rejected() {
        let provider = HttpProvider::default_for("http://127.0.0.1:8545").unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = provider
            .subscribe(tx, "eth_subscribe", "newHeads", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::SubscriptionsUnsupported));
        let err = provider.unsubscribe(&SubscriptionId("0x1".into())).await.unwrap_err();
        assert!(matches!(err, TransportError::SubscriptionsUnsupported));
    }

    #[test]
    fn bad_batch_limits_fail_construction() {
        let result = HttpProvider::with_batch("http://127.0.0.1:8545", -5, Duration::from_millis(4));
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[test]
    fn non_http_url_rejected() {
        assert!(HttpProvider::default_for("ws://127.0.0.1:8546").is_err());
    }
}

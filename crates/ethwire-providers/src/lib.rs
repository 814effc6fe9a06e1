//! ethwire-providers: build the right provider for a node URL.
//!
//! The transport is inferred from the URL scheme: `http`/`https` give a
//! stateless [`HttpProvider`], `ws`/`wss` give a started [`WsProvider`].
//!
//! # Quick start
//! ```rust,no_run
//! use ethwire_core::ProviderExt;
//!
//! # async fn run() -> Result<(), ethwire_core::TransportError> {
//! let provider = ethwire_providers::connect("ws://127.0.0.1:8546").await?;
//! let block: String = provider.call("eth_blockNumber", vec![]).await?;
//! # Ok(()) }
//! ```

pub mod scheme;

use std::sync::Arc;

use ethwire_core::config::ProviderConfig;
use ethwire_core::error::TransportError;
use ethwire_core::provider::Provider;
use ethwire_http::HttpProvider;
use ethwire_ws::WsProvider;

pub use scheme::{transport_for, Transport};

/// Connect to `url` with default settings.
///
/// WebSocket providers keep redialing until the node is reachable.
pub async fn connect(url: &str) -> Result<Arc<dyn Provider>, TransportError> {
    from_config(&ProviderConfig::new(url)).await
}

/// Build (and, for WebSockets, start) a provider from a full configuration.
pub async fn from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, TransportError> {
    match transport_for(&config.url)? {
        Transport::Http => {
            let provider = HttpProvider::new(config.url.clone(), config.http.clone())?;
            Ok(Arc::new(provider))
        }
        Transport::WebSocket => {
            let provider = WsProvider::connect(config.url.clone(), config.ws.clone()).await?;
            Ok(Arc::new(provider))
        }
    }
}

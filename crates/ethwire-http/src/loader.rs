//! Loaders turn one logical call into wire traffic.

use std::sync::Arc;

use async_trait::async_trait;

use ethwire_core::codec::JsonRpcRequest;
use ethwire_core::error::TransportError;

use crate::fetch::Fetch;

/// Resolve a request to the raw bytes of its response message.
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    async fn load(&self, req: JsonRpcRequest) -> Result<Vec<u8>, TransportError>;
}

/// Exactly one round-trip per call, no coalescing.
pub struct SyncLoader {
    fetch: Arc<dyn Fetch>,
}

impl SyncLoader {
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl Loader for SyncLoader {
    async fn load(&self, req: JsonRpcRequest) -> Result<Vec<u8>, TransportError> {
        let payload = req.encode()?;
        self.fetch.fetch(payload).await
    }
}

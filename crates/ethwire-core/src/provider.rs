//! The `Provider` trait: the capability every transport exposes to callers.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::codec::{Envelope, RpcParam, SubscriptionId};
use crate::error::TransportError;

/// Notification sink handed to [`Provider::subscribe`].
///
/// Bounded: when it is full, further notifications for the subscription
/// are dropped rather than stalling the connection.
pub type NotificationSink = mpsc::Sender<Value>;

/// The central async trait every provider implements.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn Provider>`;
/// typed calls come from [`ProviderExt`].
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Establish the connection. No-op for stateless transports.
    async fn start(&self) -> Result<(), TransportError>;

    /// Tear the connection down. Idempotent.
    async fn stop(&self);

    /// Send one call and return the decoded response envelope.
    ///
    /// Node-reported errors are still `Ok` here; they live in the envelope.
    async fn request(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<Envelope, TransportError>;

    /// Send one call and return the raw bytes of the response message.
    async fn call_raw(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<Vec<u8>, TransportError> {
        Ok(self.request(method, params).await?.raw)
    }

    /// Subscribe to `event` through `method` (e.g. `eth_subscribe`).
    ///
    /// Every later notification for the returned id is forwarded to `sink`
    /// until [`unsubscribe`](Self::unsubscribe) or connection teardown,
    /// both of which close the sink.
    async fn subscribe(
        &self,
        sink: NotificationSink,
        method: &str,
        event: &str,
        params: Vec<RpcParam>,
    ) -> Result<SubscriptionId, TransportError>;

    /// Drop a subscription. Returns `false` when the id was unknown.
    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<bool, TransportError>;

    /// Return the provider's endpoint URL.
    fn url(&self) -> &str;
}

/// Typed calls on top of any [`Provider`].
#[async_trait]
pub trait ProviderExt {
    /// Call a method and deserialize the result.
    ///
    /// Errors: [`TransportError::NilResult`] for a `null` result,
    /// [`TransportError::VmExecution`] for code `-32015`,
    /// [`TransportError::Rpc`] for any other node error.
    async fn call<T: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<T, TransportError>;
}

#[async_trait]
impl<P: Provider + ?Sized> ProviderExt for P {
    async fn call<T: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<T, TransportError> {
        self.request(method, params).await?.decode_result()
    }
}

//! Transport-level error types.

use thiserror::Error;

use crate::codec::JsonRpcError;

/// Errors that can occur during an RPC transport operation.
///
/// `Clone` so that a single batch failure can be handed to every caller that
/// joined the window.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Invalid construction parameters (batch limits, malformed URL, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request failed (connection refused, timeout, bad status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket dial/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The wire payload could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The node's VM failed to execute the call (code `-32015`).
    #[error("VM execution error {details}")]
    VmExecution { code: i64, details: String },

    /// The node answered with a `null` result.
    #[error("Result is null")]
    NilResult,

    /// The duplex connection has been torn down (or was never started).
    #[error("Websocket connection closed")]
    ConnectionClosed,

    /// Subscriptions require a duplex transport.
    #[error("subscriptions not supported over http, please use websockets")]
    SubscriptionsUnsupported,

    /// A payload or result could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

impl TransportError {
    /// Returns `true` if this error is transient at the transport level.
    ///
    /// Nothing in this workspace retries on it; callers own retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_))
    }

    /// Returns `true` if this is a node-side execution error.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::VmExecution { .. })
    }

    /// Returns `true` if the connection this call was using is gone.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        assert!(TransportError::Http("refused".into()).is_retryable());
        assert!(TransportError::WebSocket("reset".into()).is_retryable());
        assert!(!TransportError::NilResult.is_retryable());
        assert!(TransportError::VmExecution { code: -32015, details: "revert".into() }
            .is_execution_error());
        assert!(TransportError::ConnectionClosed.is_connection_closed());
    }

    #[test]
    fn vm_error_message_carries_details() {
        let e = TransportError::VmExecution {
            code: -32015,
            details: "Reverted 0x".into(),
        };
        assert_eq!(e.to_string(), "VM execution error Reverted 0x");
    }
}

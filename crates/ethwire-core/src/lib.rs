//! ethwire-core: wire codec, error taxonomy and provider capability.
//!
//! # Overview
//!
//! ethwire is a client-side JSON-RPC transport for Ethereum-style nodes.
//! The core crate defines:
//!
//! - [`codec`]: request encoding, envelope decoding and classification
//! - [`Provider`] / [`ProviderExt`]: the contract every transport implements
//! - [`TransportError`]: structured error type
//! - [`config`]: provider configuration with validation
//! - [`methods`]: method names and reserved codes
//! - [`policy`] module: token bucket for throttled logging

pub mod codec;
pub mod config;
pub mod error;
pub mod methods;
pub mod policy;
pub mod provider;

pub use codec::{
    Envelope, JsonRpcError, JsonRpcRequest, MessageKind, Notification, RpcParam, SubscriptionId,
};
pub use config::{BatchConfig, HttpConfig, ProviderConfig, WsConfig};
pub use error::TransportError;
pub use provider::{NotificationSink, Provider, ProviderExt};

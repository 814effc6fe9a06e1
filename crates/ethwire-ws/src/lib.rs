//! ethwire-ws: duplex JSON-RPC provider over a WebSocket.
//!
//! # Features
//! - Request multiplexing over a single connection, correlated by id
//! - Subscription management (`eth_subscribe` / `eth_unsubscribe`)
//! - Keepalive pings and write deadlines on a single-writer send pump
//! - Fatal teardown: one closed connection fails every waiting caller
//!
//! A provider never reconnects once its connection has died; build a new one.

pub mod client;
pub mod pending;
pub mod subscriptions;

pub use client::{ConnectionState, WsProvider};
pub use pending::PendingCalls;
pub use subscriptions::{Delivery, SubscriptionManager};

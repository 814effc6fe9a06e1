//! ethwire-http: stateless JSON-RPC provider over HTTP.
//!
//! # Features
//! - One HTTP round-trip per call ([`SyncLoader`])
//! - Time/size windowed auto-batching ([`BatchLoader`])
//! - Subscriptions are rejected; use `ethwire-ws` for those

pub mod batch;
pub mod client;
pub mod fetch;
pub mod loader;

pub use batch::BatchLoader;
pub use client::HttpProvider;
pub use fetch::{Fetch, HttpFetcher};
pub use loader::{Loader, SyncLoader};

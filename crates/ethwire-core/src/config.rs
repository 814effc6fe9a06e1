//! Provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Batching parameters for stateless transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Flush as soon as a window holds this many requests (0 = unbounded).
    #[serde(default)]
    pub max_batch_size: i64,
    /// Flush this long after the first request joined a window.
    #[serde(default = "default_batch_wait_ms")]
    pub wait_ms: u64,
}

fn default_batch_wait_ms() -> u64 { 4 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 0,
            wait_ms: default_batch_wait_ms(),
        }
    }
}

impl BatchConfig {
    pub fn new(max_batch_size: i64, wait: Duration) -> Self {
        Self {
            max_batch_size,
            wait_ms: wait.as_millis() as u64,
        }
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Reject limits that can never describe a usable window.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.max_batch_size < 0 {
            return Err(TransportError::Config(
                "maximum batch size can not be negative".into(),
            ));
        }
        if self.wait() < Duration::from_millis(1) {
            return Err(TransportError::Config(
                "minimum wait time must be at least 1 millisecond".into(),
            ));
        }
        Ok(())
    }

    /// The size limit as a count; `None` means unbounded.
    pub fn size_limit(&self) -> Option<usize> {
        match self.max_batch_size {
            n if n <= 0 => None,
            n => Some(n as usize),
        }
    }
}

/// Configuration for the HTTP provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per HTTP round-trip timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Coalesce concurrent calls into wire batches when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,
}

fn default_request_timeout_ms() -> u64 { 30_000 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            batch: None,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration for the WebSocket provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsConfig {
    /// Keep redialing on connect failure instead of failing `start`.
    #[serde(default = "bool_true")]
    pub reconnect: bool,
    /// Fixed delay between dial attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// At most one dial-failure warning per interval.
    #[serde(default = "default_dial_warn_interval_ms")]
    pub dial_warn_interval_ms: u64,
    /// Deadline for every frame write.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Deadline for the next inbound frame; no deadline when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    /// Ping period. Keep below the peer's pong wait.
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Capacity of the outbound queue feeding the send pump.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

fn bool_true() -> bool { true }
fn default_reconnect_delay_ms() -> u64 { 1_000 }
fn default_dial_warn_interval_ms() -> u64 { 60_000 }
fn default_write_timeout_ms() -> u64 { 60_000 }
fn default_keepalive_interval_ms() -> u64 { 54_000 }
fn default_send_queue_capacity() -> usize { 1_024 }

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            dial_warn_interval_ms: default_dial_warn_interval_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            read_timeout_ms: None,
            keepalive_interval_ms: default_keepalive_interval_ms(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

impl WsConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn dial_warn_interval(&self) -> Duration {
        Duration::from_millis(self.dial_warn_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.keepalive_interval_ms == 0 {
            return Err(TransportError::Config("keepalive interval must be positive".into()));
        }
        if self.send_queue_capacity == 0 {
            return Err(TransportError::Config("send queue capacity must be positive".into()));
        }
        Ok(())
    }
}

/// Everything needed to build a provider for one node endpoint.
///
/// The transport is chosen from the URL scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub url: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ws: WsConfig,
}

impl ProviderConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: HttpConfig::default(),
            ws: WsConfig::default(),
        }
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.http.batch = Some(batch);
        self
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.ws.reconnect = reconnect;
        self
    }
}

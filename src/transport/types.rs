//! Transport types and configuration

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// RPC transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL to connect to (including the `app_id` query)
    pub url: String,
    /// Time a request may stay outstanding before it fails with a timeout
    pub request_timeout: Duration,
    /// Maximum consecutive reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Backoff base; attempt `n` waits `2^n * base`
    pub reconnect_base: Duration,
    /// Backoff ceiling
    pub reconnect_cap: Duration,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set per-request timeout
    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = d;
        self
    }

    /// Set maximum reconnection attempts
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    /// Set backoff base and ceiling
    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based)
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.reconnect_base, self.reconnect_cap)
    }
}

/// `min(cap, 2^attempt * base)`
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// Events emitted by the connection task to the layer above
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Unsolicited message (not matching any pending request)
    Push(Value),
    /// Connection lost, reconnecting after `delay`
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnected and re-authorized; push subscriptions must be replayed
    Reconnected,
    /// Deliberate disconnect completed
    Closed,
    /// Reconnection gave up
    Fatal(TransportError),
}

/// Transport errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// Handshake or stream failure
    #[error("Connection failed: {0}")]
    Connection(String),
    /// No response before the request deadline
    #[error("Request {req_id} timed out")]
    Timeout { req_id: u64 },
    /// Venue returned an error payload for the request
    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },
    /// Connection went away while the request was outstanding
    #[error("Disconnected")]
    Disconnected,
    /// Reconnection attempts exhausted
    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,
    /// Response did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

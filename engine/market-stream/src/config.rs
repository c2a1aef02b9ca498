//! Configuration for the market stream

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and liveness settings for the market channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket endpoint, without the `user_id` query parameter
    pub url: String,

    /// First reconnect delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds
    pub max_backoff_ms: u64,

    /// Ping interval in seconds
    pub heartbeat_interval_secs: u64,

    /// Reconnect when no pong arrived for this many seconds
    pub pong_timeout_secs: u64,

    /// Events buffered between the socket task and the consumer
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/api/portfolio/ws/market".to_string(),
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            heartbeat_interval_secs: 15,
            pong_timeout_secs: 60,
            channel_capacity: 10_000,
        }
    }
}

impl StreamConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

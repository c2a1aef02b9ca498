//! Configuration for the OrderGateway

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the OrderGateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderGatewayConfig {
    /// How long a caller waits for an acknowledgement, in milliseconds
    pub submission_timeout_ms: u64,

    /// Capacity of the order outcome broadcast
    pub outcome_buffer: usize,
}

impl Default for OrderGatewayConfig {
    fn default() -> Self {
        Self {
            submission_timeout_ms: 10_000,
            outcome_buffer: 256,
        }
    }
}

impl OrderGatewayConfig {
    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }
}

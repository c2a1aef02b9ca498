//! Configuration for the Valuation Store

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Capacity of the mutation queue feeding the owning task
    pub command_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { command_buffer: 1024 }
    }
}

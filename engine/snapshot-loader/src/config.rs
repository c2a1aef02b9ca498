//! Configuration for the snapshot loader

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Backend base URL, e.g. `http://localhost:8000`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000".to_string(), request_timeout_secs: 30 }
    }
}

impl SnapshotConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

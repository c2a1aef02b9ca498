//! Configuration for the execution reconciler

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Execution ids remembered for duplicate detection
    pub seen_window_capacity: usize,

    /// Request a snapshot refresh after each applied execution
    pub refresh_after_execution: bool,

    /// Capacity of the execution notice broadcast
    pub notice_buffer: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { seen_window_capacity: 4096, refresh_after_execution: true, notice_buffer: 256 }
    }
}

//! Notification queue settings

use serde::{Deserialize, Serialize};

/// Bounded retry queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Maximum number of pending jobs
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Failed attempts before a job is dead-lettered
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles per attempt
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Finished job ids remembered for duplicate suppression
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,

    /// Dead letters kept for inspection; the oldest is dropped beyond this
    #[serde(default = "default_max_dead_letters")]
    pub max_dead_letters: usize,
}

fn default_capacity() -> usize {
    256
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_dedup_window() -> usize {
    4_096
}

fn default_max_dead_letters() -> usize {
    256
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            dedup_window: default_dedup_window(),
            max_dead_letters: default_max_dead_letters(),
        }
    }
}

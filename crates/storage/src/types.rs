//! Shared settings for retry and journal behavior.

use std::time::Duration;

use media_relay_common::{
    DEFAULT_JOURNAL_BATCH_THRESHOLD, DEFAULT_JOURNAL_PERIODIC_INTERVAL,
    DEFAULT_JOURNAL_SAVE_INTERVAL,
};
use serde::{Deserialize, Serialize};

/// Retry settings for remote operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Backoff multiplier (exponential backoff).
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Persistence settings for an upload journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    /// Minimum time between two non-forced saves, in milliseconds.
    pub save_interval_ms: u64,
    /// Period of the background save task, in milliseconds.
    pub periodic_interval_ms: u64,
    /// Number of new marks that requests an early background save. Zero disables.
    pub batch_threshold: usize,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            save_interval_ms: DEFAULT_JOURNAL_SAVE_INTERVAL.as_millis() as u64,
            periodic_interval_ms: DEFAULT_JOURNAL_PERIODIC_INTERVAL.as_millis() as u64,
            batch_threshold: DEFAULT_JOURNAL_BATCH_THRESHOLD,
        }
    }
}

impl JournalSettings {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_millis(self.periodic_interval_ms)
    }
}

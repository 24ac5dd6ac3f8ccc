//! Autosave configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for autosave behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutosaveConfig {
    /// Whether timed (debounced) flushes run at all.
    ///
    /// Explicit save, close and shutdown flush regardless.
    pub enabled: bool,

    /// Debounce delay in milliseconds.
    ///
    /// After an edit, the scheduler waits this long before saving.
    /// Additional edits reset the timer.
    pub debounce_ms: u64,

    /// Maximum delay before forcing a save.
    ///
    /// If edits keep coming, save after this many milliseconds
    /// since the first unsaved edit.
    pub max_delay_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 750,
            max_delay_ms: 10_000,
        }
    }
}

impl AutosaveConfig {
    /// Create a config with timed flushes turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Create an enabled config with the given debounce and no practical ceiling.
    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            enabled: true,
            debounce_ms: debounce.as_millis() as u64,
            max_delay_ms: u64::MAX,
        }
    }

    /// How long to wait before flushing, given how long the oldest unsaved
    /// edit has been waiting. `None` when timed flushes are disabled.
    pub fn flush_delay(&self, since_first_unsaved_ms: u64) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let remaining = self.max_delay_ms.saturating_sub(since_first_unsaved_ms);
        Some(Duration::from_millis(self.debounce_ms.min(remaining)))
    }
}

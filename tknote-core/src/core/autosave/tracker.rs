//! Dirty state tracking for autosave.

use super::AutosaveConfig;
use std::time::{Duration, Instant};

/// Tracks unsaved changes in one edit buffer.
///
/// Every edit bumps a generation counter. A save records the generation it
/// snapshotted, and only clears the dirty flag if no edit arrived while it
/// was being written.
#[derive(Debug, Clone)]
pub struct DirtyTracker {
    /// Whether there are unsaved changes.
    dirty: bool,

    /// Incremented on every change.
    generation: u64,

    /// When the first unsaved change was made.
    /// Reset when saved.
    first_unsaved_change: Option<Instant>,

    /// Whether a save is currently in progress.
    saving: bool,
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyTracker {
    /// Create a new tracker with no unsaved changes.
    pub fn new() -> Self {
        Self {
            dirty: false,
            generation: 0,
            first_unsaved_change: None,
            saving: false,
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark the buffer as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.generation += 1;

        // Only set first_unsaved_change if this is the first change since last save
        if self.first_unsaved_change.is_none() {
            self.first_unsaved_change = Some(Instant::now());
        }
    }

    /// Mark that a save has started; returns the generation being saved.
    pub fn start_save(&mut self) -> u64 {
        self.saving = true;
        self.generation
    }

    /// Mark that the save of `generation` completed.
    ///
    /// Returns `true` when the buffer is now clean, `false` when newer edits
    /// arrived in the meantime and still need a save.
    pub fn save_complete(&mut self, generation: u64) -> bool {
        self.saving = false;
        if generation != self.generation {
            return false;
        }
        self.dirty = false;
        self.first_unsaved_change = None;
        true
    }

    /// Mark that a save has failed.
    pub fn save_failed(&mut self) {
        self.saving = false;
        // Keep dirty = true since save failed
    }

    /// Get milliseconds since the first unsaved change.
    pub fn ms_since_first_unsaved(&self) -> Option<u64> {
        self.first_unsaved_change
            .map(|t| t.elapsed().as_millis() as u64)
    }

    /// Delay until the next timed flush should run, or `None` if nothing is due.
    pub fn flush_delay(&self, config: &AutosaveConfig) -> Option<Duration> {
        if !self.dirty {
            return None;
        }
        config.flush_delay(self.ms_since_first_unsaved().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_tracker_is_clean() {
        let tracker = DirtyTracker::new();
        assert!(!tracker.is_dirty());
        assert!(!tracker.is_saving());
        assert_eq!(tracker.flush_delay(&AutosaveConfig::default()), None);
    }

    #[test]
    fn test_mark_dirty() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty();
        assert!(tracker.is_dirty());
        assert_eq!(tracker.generation(), 1);
        assert!(tracker.ms_since_first_unsaved().is_some());
    }

    #[test]
    fn test_save_complete() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty();
        let generation = tracker.start_save();
        assert!(tracker.is_saving());

        assert!(tracker.save_complete(generation));
        assert!(!tracker.is_dirty());
        assert!(!tracker.is_saving());
        assert!(tracker.ms_since_first_unsaved().is_none());
    }

    #[test]
    fn test_edit_during_save_keeps_dirty() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty();
        let generation = tracker.start_save();
        tracker.mark_dirty();

        assert!(!tracker.save_complete(generation));
        assert!(tracker.is_dirty());
        assert!(!tracker.is_saving());
    }

    #[test]
    fn test_save_failed() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty();
        tracker.start_save();
        tracker.save_failed();

        assert!(tracker.is_dirty()); // Still dirty
        assert!(!tracker.is_saving());
    }

    #[test]
    fn test_flush_delay_shrinks_towards_max_delay() {
        let config = AutosaveConfig {
            enabled: true,
            debounce_ms: 1_000,
            max_delay_ms: 80,
        };
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty();

        let first = tracker.flush_delay(&config).unwrap();
        assert!(first <= Duration::from_millis(80));

        thread::sleep(Duration::from_millis(100));
        tracker.mark_dirty();
        assert_eq!(tracker.flush_delay(&config), Some(Duration::ZERO));
    }
}

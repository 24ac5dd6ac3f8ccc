//! Debounced persistence of in-memory note edits.
//!
//! Provides:
//! - `AutosaveScheduler` - per-note edit buffers, debounce timers and the blocking flush points
//! - `DirtyTracker` - tracks unsaved changes of one buffer
//! - `AutosaveConfig` - user settings for autosave behavior

mod config;
mod scheduler;
mod tracker;

pub use config::AutosaveConfig;
pub use scheduler::{
    AutosaveScheduler, AutosaveStats, BufferEdit, EditBuffer, FlushTrigger, FlushWarning,
    LostChanges, ShutdownReport,
};
pub use tracker::DirtyTracker;

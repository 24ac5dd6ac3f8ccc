//! Core library for TkNote, a small, local-first note-taking application.
//!
//! The primary entry point is [`Notebook`], which represents an open notes
//! database. Note edits go through its autosave buffers, deletes through the
//! trash, and window preferences through the application state manager.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    app_state::{AppStateManager, ApplicationState},
    autosave::{
        AutosaveConfig, AutosaveScheduler, AutosaveStats, BufferEdit, DirtyTracker, EditBuffer,
        FlushTrigger, FlushWarning, LostChanges, ShutdownReport,
    },
    config::{load_config, save_config, NotebookConfig},
    error::{Result, TkNoteError},
    listing::{NoteFilter, NoteIter, NoteQuery, SortKey, SortSpec},
    note::{Note, NoteState},
    notebook::{Notebook, ShutdownSummary},
    record_store::{NoteChange, RecordStore},
    storage::Storage,
    trash::{DeleteOutcome, TrashConfig, TrashManager},
};

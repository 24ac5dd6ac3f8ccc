//! Internal domain modules for the TkNote core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod app_state;
pub mod autosave;
pub mod config;
pub mod error;
pub mod listing;
pub mod note;
pub mod notebook;
pub mod record_store;
pub mod storage;
pub mod trash;

#[doc(inline)]
pub use app_state::{AppStateManager, ApplicationState};
#[doc(inline)]
pub use autosave::{
    AutosaveConfig, AutosaveScheduler, AutosaveStats, BufferEdit, DirtyTracker, EditBuffer,
    FlushTrigger, FlushWarning, LostChanges, ShutdownReport,
};
#[doc(inline)]
pub use config::{load_config, save_config, NotebookConfig};
#[doc(inline)]
pub use error::{Result, TkNoteError};
#[doc(inline)]
pub use listing::{NoteFilter, NoteIter, NoteQuery, SortKey, SortSpec};
#[doc(inline)]
pub use note::{Note, NoteState};
#[doc(inline)]
pub use notebook::{Notebook, ShutdownSummary};
#[doc(inline)]
pub use record_store::{NoteChange, RecordStore};
#[doc(inline)]
pub use storage::Storage;
#[doc(inline)]
pub use trash::{DeleteOutcome, TrashConfig, TrashManager};

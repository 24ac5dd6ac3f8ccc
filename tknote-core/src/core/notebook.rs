//! The open notebook: one database file plus the managers that sit on it.

use crate::{
    AppStateManager, AutosaveScheduler, BufferEdit, DeleteOutcome, EditBuffer, Note, NoteFilter,
    NoteQuery, NotebookConfig, RecordStore, Result, ShutdownReport, TrashManager,
};
use std::sync::Arc;

/// An open TkNote notebook.
///
/// `Notebook` is the entry point the GUI holds. It owns the [`RecordStore`]
/// and wires the [`AutosaveScheduler`], [`TrashManager`] and
/// [`AppStateManager`] to it. Note edits go through the autosave buffers,
/// deletes through the trash, and preferences through the state manager.
///
/// Finish with [`shutdown`](Self::shutdown) so pending edits and the window
/// state reach the disk.
pub struct Notebook {
    config: NotebookConfig,
    store: Arc<RecordStore>,
    autosave: AutosaveScheduler,
    trash: TrashManager,
    app_state: AppStateManager,
}

/// Outcome of [`Notebook::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownSummary {
    pub autosave: ShutdownReport,
    /// Set when the final application-state save failed.
    pub app_state_error: Option<String>,
    /// Notes removed by `empty_trash_on_exit`.
    pub trash_emptied: usize,
    pub trash_error: Option<String>,
}

impl ShutdownSummary {
    pub fn is_clean(&self) -> bool {
        self.autosave.is_clean() && self.app_state_error.is_none() && self.trash_error.is_none()
    }
}

impl Notebook {
    /// Opens (or creates) the notebook described by `config`.
    ///
    /// Trash retention runs once here; a failure is logged and does not stop
    /// the notebook from opening.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TkNoteError::StorageUnavailable`] if the database
    /// cannot be opened, or [`crate::TkNoteError::Io`] if its directory or
    /// the autosave runtime cannot be created.
    pub fn open(config: NotebookConfig) -> Result<Self> {
        let store = Arc::new(RecordStore::open(&config.storage_path)?);

        let mut trash = TrashManager::new(Arc::clone(&store), config.trash.clone());
        if let Err(e) = trash.apply_retention() {
            log::warn!("Trash retention failed at startup: {e}");
        }

        let app_state = AppStateManager::load(Arc::clone(&store));
        let autosave = AutosaveScheduler::new(Arc::clone(&store), config.autosave.clone())?;

        log::info!("Opened notebook {}", config.storage_path.display());
        Ok(Self {
            config,
            store,
            autosave,
            trash,
            app_state,
        })
    }

    pub fn config(&self) -> &NotebookConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn autosave(&self) -> &AutosaveScheduler {
        &self.autosave
    }

    pub fn trash(&self) -> &TrashManager {
        &self.trash
    }

    pub fn trash_mut(&mut self) -> &mut TrashManager {
        &mut self.trash
    }

    pub fn app_state(&self) -> &AppStateManager {
        &self.app_state
    }

    pub fn app_state_mut(&mut self) -> &mut AppStateManager {
        &mut self.app_state
    }

    pub fn create_note(&self, title: &str, body: &str) -> Result<Note> {
        self.store.create_note(title, body)
    }

    pub fn open_note(&self, note_id: &str) -> Result<EditBuffer> {
        self.autosave.open(note_id)
    }

    pub fn edit_note(&self, note_id: &str, edit: BufferEdit) -> Result<EditBuffer> {
        self.autosave.edit(note_id, edit)
    }

    pub fn save_note(&self, note_id: &str) -> Result<bool> {
        self.autosave.save(note_id)
    }

    pub fn close_note(&self, note_id: &str) -> Result<()> {
        self.autosave.close(note_id)
    }

    /// Lists notes in the order the user last chose.
    ///
    /// Listings that include the trash apply the retention policy first.
    pub fn list_notes(&mut self, filter: NoteFilter) -> NoteQuery<'_> {
        if filter != NoteFilter::Active {
            if let Err(e) = self.trash.apply_retention() {
                log::warn!("Trash retention sweep failed: {e}");
            }
        }
        self.store.list_notes(filter, self.app_state.sort_spec())
    }

    /// The trash, in the order the user last chose, after retention.
    pub fn list_trash(&mut self) -> Result<Vec<Note>> {
        let sort = self.app_state.sort_spec();
        self.trash.list_trash(sort)
    }

    /// Deletes a note from the GUI.
    ///
    /// An open buffer is flushed and closed first so its last edits land in
    /// the trashed note. If that flush fails nothing is deleted.
    pub fn delete_note(&mut self, note_id: &str) -> Result<DeleteOutcome> {
        self.autosave.close(note_id)?;
        let outcome = self.trash.delete(note_id)?;

        if self.app_state.state().selected_note_id.as_deref() == Some(note_id) {
            if let Err(e) = self.app_state.set_selected_note(None) {
                log::warn!("Could not clear selection of deleted note {note_id}: {e}");
            }
        }
        Ok(outcome)
    }

    pub fn undo_delete(&mut self) -> Result<Option<Note>> {
        self.trash.undo()
    }

    pub fn restore_note(&mut self, note_id: &str) -> Result<Note> {
        self.trash.restore(note_id)
    }

    pub fn empty_trash(&mut self) -> Result<usize> {
        self.trash.empty_trash()
    }

    /// Flushes every open buffer, saves the application state and, if
    /// configured, empties the trash.
    ///
    /// Nothing here is fatal: each failure is logged and reported in the
    /// returned summary.
    pub fn shutdown(self) -> ShutdownSummary {
        let Self {
            config,
            store: _store,
            autosave,
            mut trash,
            app_state,
        } = self;

        let mut summary = ShutdownSummary {
            autosave: autosave.shutdown(config.shutdown_timeout()),
            ..Default::default()
        };

        if let Err(e) = app_state.save() {
            log::warn!("Could not save application state at shutdown: {e}");
            summary.app_state_error = Some(e.user_message());
        }

        if config.empty_trash_on_exit {
            match trash.empty_trash() {
                Ok(purged) => summary.trash_emptied = purged,
                Err(e) => {
                    log::warn!("Could not empty the trash at shutdown: {e}");
                    summary.trash_error = Some(e.user_message());
                }
            }
        }

        log::info!("Closed notebook {}", config.storage_path.display());
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AutosaveConfig, SortKey, SortSpec, TkNoteError};
    use std::path::Path;
    use tempfile::TempDir;

    fn config(dir: &Path) -> NotebookConfig {
        let mut config = NotebookConfig::at(dir.join("notes.db"));
        config.autosave = AutosaveConfig::disabled();
        config
    }

    #[test]
    fn test_edits_persist_across_sessions() {
        let dir = TempDir::new().unwrap();
        let id = {
            let notebook = Notebook::open(config(dir.path())).unwrap();
            let note = notebook.create_note("Draft", "").unwrap();
            notebook.open_note(&note.id).unwrap();
            notebook
                .edit_note(&note.id, BufferEdit::body("first line\nsecond"))
                .unwrap();
            notebook.close_note(&note.id).unwrap();
            assert!(notebook.shutdown().is_clean());
            note.id
        };

        let notebook = Notebook::open(config(dir.path())).unwrap();
        let note = notebook.store().get_note(&id).unwrap();
        assert_eq!(note.body, "first line\nsecond");
        assert_eq!(note.preview(), "first line");
    }

    #[test]
    fn test_shutdown_flushes_buffers_and_saves_state() {
        let dir = TempDir::new().unwrap();
        let id = {
            let mut notebook = Notebook::open(config(dir.path())).unwrap();
            let note = notebook.create_note("Title", "Body").unwrap();
            notebook.open_note(&note.id).unwrap();
            notebook
                .edit_note(&note.id, BufferEdit::title("Unsaved title"))
                .unwrap();
            notebook
                .app_state_mut()
                .set_window_geometry(10, 20, 800, 600)
                .unwrap();

            let summary = notebook.shutdown();
            assert!(summary.is_clean());
            assert_eq!(summary.autosave.flushed, vec![note.id.clone()]);
            note.id
        };

        let notebook = Notebook::open(config(dir.path())).unwrap();
        assert_eq!(notebook.store().get_note(&id).unwrap().title, "Unsaved title");
        assert_eq!(notebook.app_state().state().window_width, 800);
    }

    #[test]
    fn test_delete_flushes_open_buffer_first() {
        let dir = TempDir::new().unwrap();
        let mut notebook = Notebook::open(config(dir.path())).unwrap();
        let note = notebook.create_note("Doomed", "old").unwrap();
        notebook.open_note(&note.id).unwrap();
        notebook.edit_note(&note.id, BufferEdit::body("new")).unwrap();

        let outcome = notebook.delete_note(&note.id).unwrap();
        match outcome {
            DeleteOutcome::Trashed(trashed) => assert_eq!(trashed.body, "new"),
            other => panic!("expected a trashed note, got {other:?}"),
        }
        assert!(notebook.autosave().open_buffers().is_empty());
        assert!(matches!(
            notebook.open_note(&note.id),
            Err(TkNoteError::InvalidState(_))
        ));
    }

    #[test]
    fn test_delete_and_undo() {
        let dir = TempDir::new().unwrap();
        let mut notebook = Notebook::open(config(dir.path())).unwrap();
        let a = notebook.create_note("A", "a").unwrap();
        let b = notebook.create_note("B", "b").unwrap();
        notebook.delete_note(&a.id).unwrap();
        notebook.delete_note(&b.id).unwrap();
        assert_eq!(notebook.list_notes(NoteFilter::Active).iter().count(), 0);

        assert_eq!(notebook.undo_delete().unwrap().unwrap().id, b.id);
        assert_eq!(notebook.undo_delete().unwrap().unwrap().id, a.id);
        assert!(notebook.undo_delete().unwrap().is_none());
        assert_eq!(notebook.list_notes(NoteFilter::Active).iter().count(), 2);
    }

    #[test]
    fn test_delete_clears_selection() {
        let dir = TempDir::new().unwrap();
        let mut notebook = Notebook::open(config(dir.path())).unwrap();
        let note = notebook.create_note("Selected", "x").unwrap();
        notebook
            .app_state_mut()
            .set_selected_note(Some(&note.id))
            .unwrap();

        notebook.delete_note(&note.id).unwrap();
        assert_eq!(notebook.app_state().state().selected_note_id, None);
    }

    #[test]
    fn test_list_notes_follows_saved_sort() {
        let dir = TempDir::new().unwrap();
        let mut notebook = Notebook::open(config(dir.path())).unwrap();
        for title in ["b", "c", "a"] {
            notebook.create_note(title, "").unwrap();
        }
        notebook
            .app_state_mut()
            .set_sort(SortSpec::ascending(SortKey::Title))
            .unwrap();

        let titles: Vec<String> = notebook
            .list_notes(NoteFilter::Active)
            .iter()
            .map(|n| n.unwrap().title)
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_trash_listing_applies_retention() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.trash.retention_days = Some(1);
        let mut notebook = Notebook::open(config).unwrap();

        let expired = notebook.create_note("Expired", "x").unwrap();
        let fresh = notebook.create_note("Fresh", "y").unwrap();
        let kept = notebook.create_note("Kept", "z").unwrap();
        for id in [&expired.id, &fresh.id] {
            notebook.delete_note(id).unwrap();
        }
        let three_days_ago = crate::core::record_store::now_millis() - 3 * 24 * 60 * 60 * 1000;
        notebook.store().with_connection(|c| {
            c.execute(
                "UPDATE notes SET trashed_at = ?1 WHERE id = ?2",
                rusqlite::params![three_days_ago, expired.id],
            )
            .unwrap()
        });

        let trashed = notebook.list_notes(NoteFilter::Trashed).to_vec().unwrap();
        assert_eq!(trashed.len(), 1);
        assert_eq!(trashed[0].id, fresh.id);
        assert!(matches!(
            notebook.store().get_note(&expired.id),
            Err(TkNoteError::NotFound(_))
        ));
        assert_eq!(notebook.list_trash().unwrap(), trashed);
        assert_eq!(notebook.list_notes(NoteFilter::All).iter().count(), 2);
        assert!(notebook.store().get_note(&kept.id).is_ok());
    }

    #[test]
    fn test_restore_and_empty_trash() {
        let dir = TempDir::new().unwrap();
        let mut notebook = Notebook::open(config(dir.path())).unwrap();
        let a = notebook.create_note("A", "a").unwrap();
        let b = notebook.create_note("B", "b").unwrap();
        notebook.delete_note(&a.id).unwrap();
        notebook.delete_note(&b.id).unwrap();

        assert!(!notebook.restore_note(&a.id).unwrap().is_trashed());
        assert_eq!(notebook.empty_trash().unwrap(), 1);
        assert_eq!(notebook.store().count_notes(NoteFilter::All).unwrap(), 1);
    }

    #[test]
    fn test_empty_trash_on_exit() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.empty_trash_on_exit = true;

        let mut notebook = Notebook::open(config.clone()).unwrap();
        let a = notebook.create_note("A", "a").unwrap();
        notebook.create_note("B", "b").unwrap();
        notebook.delete_note(&a.id).unwrap();

        let summary = notebook.shutdown();
        assert_eq!(summary.trash_emptied, 1);

        let notebook = Notebook::open(config).unwrap();
        assert_eq!(notebook.store().count_notes(NoteFilter::All).unwrap(), 1);
    }

    #[test]
    fn test_open_reports_unusable_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let result = Notebook::open(NotebookConfig::at(blocker.join("notes.db")));
        assert!(result.err().unwrap().is_storage_unavailable());
    }
}

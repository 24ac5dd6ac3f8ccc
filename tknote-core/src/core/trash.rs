//! Soft delete, restore and the session undo history.
//!
//! Deleting a note from the GUI only ever moves it to the trash; the row
//! stays on disk until the trash is emptied, a retention sweep removes it,
//! or the user purges it explicitly.

use crate::core::record_store::now_millis;
use crate::{Note, NoteFilter, RecordStore, Result, SortSpec, TkNoteError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// How the trash behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrashConfig {
    /// Maximum number of deletes [`TrashManager::undo`] can walk back.
    pub undo_depth: usize,

    /// Purge trashed notes once they have been in the trash this many days.
    /// `None` keeps them until the trash is emptied.
    pub retention_days: Option<u32>,

    /// Delete notes with a blank title and body outright instead of
    /// trashing them. Such deletes cannot be undone.
    pub purge_empty_notes: bool,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            undo_depth: 32,
            retention_days: None,
            purge_empty_notes: false,
        }
    }
}

/// What [`TrashManager::delete`] did with the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The note is in the trash (or already was).
    Trashed(Note),
    /// The note was empty and has been removed permanently.
    Purged(String),
}

impl DeleteOutcome {
    pub fn note_id(&self) -> &str {
        match self {
            Self::Trashed(note) => &note.id,
            Self::Purged(id) => id,
        }
    }
}

/// Turns delete requests into trash transitions and remembers them for undo.
pub struct TrashManager {
    store: Arc<RecordStore>,
    config: TrashConfig,
    /// Most recent delete first.
    history: VecDeque<String>,
}

impl TrashManager {
    pub fn new(store: Arc<RecordStore>, config: TrashConfig) -> Self {
        Self {
            store,
            config,
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &TrashConfig {
        &self.config
    }

    /// Deletes a note the way the GUI does: moves it to the trash and
    /// records it for [`undo`](Self::undo). Only when `purge_empty_notes` is
    /// set is a blank note removed outright instead.
    ///
    /// Deleting a note that is already in the trash returns it unchanged and
    /// does not touch the history.
    pub fn delete(&mut self, note_id: &str) -> Result<DeleteOutcome> {
        let note = self.store.get_note(note_id)?;
        if note.is_trashed() {
            return Ok(DeleteOutcome::Trashed(note));
        }

        if self.config.purge_empty_notes && note.is_empty() {
            self.store.purge(note_id)?;
            self.forget(note_id);
            log::debug!("Deleted empty note {note_id} without trashing it");
            return Ok(DeleteOutcome::Purged(note.id));
        }

        let note = self.store.mark_trashed(note_id)?;
        self.remember(note_id);
        Ok(DeleteOutcome::Trashed(note))
    }

    fn remember(&mut self, note_id: &str) {
        self.forget(note_id);
        self.history.push_front(note_id.to_string());
        self.history.truncate(self.config.undo_depth);
    }

    fn forget(&mut self, note_id: &str) {
        self.history.retain(|id| id != note_id);
    }

    /// Restores the most recently deleted note of this session.
    ///
    /// Notes that were purged or restored since they were deleted are
    /// skipped. Returns `None` once there is nothing left to undo.
    pub fn undo(&mut self) -> Result<Option<Note>> {
        while let Some(note_id) = self.history.pop_front() {
            let note = match self.store.get_note(&note_id) {
                Ok(note) => note,
                Err(TkNoteError::NotFound(_)) => continue,
                Err(e) => {
                    self.history.push_front(note_id);
                    return Err(e);
                }
            };
            if !note.is_trashed() {
                continue;
            }

            match self.store.restore(&note_id) {
                Ok(note) => return Ok(Some(note)),
                Err(e) => {
                    self.history.push_front(note_id);
                    return Err(e);
                }
            }
        }
        Ok(None)
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// IDs that [`undo`](Self::undo) would visit, most recent first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Restores a specific trashed note.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::InvalidState`] if the note is not in the trash.
    pub fn restore(&mut self, note_id: &str) -> Result<Note> {
        let note = self.store.restore(note_id)?;
        self.forget(note_id);
        Ok(note)
    }

    /// Permanently removes a note from the trash.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::InvalidState`] for Active notes; those must be
    /// deleted first.
    pub fn purge(&mut self, note_id: &str) -> Result<()> {
        let note = self.store.get_note(note_id)?;
        if !note.is_trashed() {
            return Err(TkNoteError::InvalidState(format!(
                "Note {note_id} must be in the trash before it can be purged"
            )));
        }
        self.store.purge(note_id)?;
        self.forget(note_id);
        Ok(())
    }

    /// Purges everything in the trash and clears the undo history.
    pub fn empty_trash(&mut self) -> Result<usize> {
        let purged = self.store.purge_all_trashed()?;
        self.history.clear();
        log::info!("Emptied trash: {purged} note(s) removed");
        Ok(purged)
    }

    /// Lists the trash after applying the retention policy.
    pub fn list_trash(&mut self, sort: SortSpec) -> Result<Vec<Note>> {
        if let Err(e) = self.apply_retention() {
            log::warn!("Trash retention sweep failed: {e}");
        }
        self.store.list_notes(NoteFilter::Trashed, sort).to_vec()
    }

    /// Purges notes that have outlived `retention_days`. A no-op when no
    /// retention is configured.
    pub fn apply_retention(&mut self) -> Result<usize> {
        let Some(days) = self.config.retention_days else {
            return Ok(0);
        };
        let cutoff = now_millis() - i64::from(days) * MILLIS_PER_DAY;
        let purged = self.store.purge_trashed_before(cutoff)?;
        if purged > 0 {
            log::info!("Retention removed {purged} note(s) trashed more than {days} day(s) ago");
        }
        Ok(purged)
    }
}

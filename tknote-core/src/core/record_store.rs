//! Durable note and application-state records over a TkNote SQLite database.

use crate::core::app_state::{ApplicationState, APP_STATE_ROW_ID};
use crate::core::listing::{NoteFilter, NoteQuery, SortKey, SortSpec};
use crate::{Note, NoteState, Result, Storage, TkNoteError};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const NOTE_COLUMNS: &str = "id, title, body, created_at, modified_at, state, trashed_at";

/// Current wall-clock time as Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A note together with the time its row last changed in any way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteChange {
    pub changed_at: i64,
    pub note: Note,
}

/// The single authority for persisted notes and application state.
///
/// All access goes through one connection behind a mutex: there is exactly one
/// writer at a time, every write runs in its own `IMMEDIATE` transaction, and
/// readers never see a partially applied write. `RecordStore` is `Sync` and is
/// shared between the managers as an `Arc<RecordStore>`.
pub struct RecordStore {
    storage: Mutex<Storage>,
    path: Option<PathBuf>,
}

impl RecordStore {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::StorageUnavailable`] or [`TkNoteError::Io`] if the
    /// file cannot be created, opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let storage = Storage::open(&path)?;
        log::info!("Opened note store at {}", path.as_ref().display());
        Ok(Self {
            storage: Mutex::new(storage),
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            storage: Mutex::new(Storage::open_in_memory()?),
            path: None,
        })
    }

    /// Location of the database file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Storage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` inside one immediate transaction; commits only if `f` succeeds.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut storage = self.lock();
        let tx = storage
            .connection_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Notes ────────────────────────────────────────────────────

    /// Inserts a new Active note with a fresh identifier.
    pub fn create_note(&self, title: &str, body: &str) -> Result<Note> {
        let now = now_millis();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            modified_at: now,
            state: NoteState::Active,
            trashed_at: None,
        };

        self.write(|tx| {
            tx.execute(
                "INSERT INTO notes (id, title, body, created_at, modified_at, changed_at, state, trashed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, NULL)",
                rusqlite::params![
                    note.id,
                    note.title,
                    note.body,
                    note.created_at,
                    note.modified_at,
                    note.state.as_str(),
                ],
            )?;
            Ok(())
        })?;

        log::debug!("Created note {}", note.id);
        Ok(note)
    }

    /// Fetches a single note by ID.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::NotFound`] if no note has this ID.
    pub fn get_note(&self, note_id: &str) -> Result<Note> {
        get_note_in(self.lock().connection(), note_id)
    }

    /// Lists notes in `filter`, ordered by `sort` with id-ascending tie-break.
    ///
    /// Nothing is read until the returned query is iterated.
    pub fn list_notes(&self, filter: NoteFilter, sort: SortSpec) -> NoteQuery<'_> {
        NoteQuery::new(self, filter, sort)
    }

    /// Lists notes edited after `since` (Unix ms), oldest edit first.
    ///
    /// This is the incremental-sync entry point: remember the largest
    /// `modified_at` seen and pass it back on the next call.
    pub fn list_modified_since(&self, since: i64, filter: NoteFilter) -> NoteQuery<'_> {
        NoteQuery::new(self, filter, SortSpec::ascending(SortKey::Modified)).modified_since(since)
    }

    /// Returns every note whose row changed after `since`, including trash and
    /// restore transitions that leave `modified_at` untouched.
    pub fn list_changed_since(&self, since: i64) -> Result<Vec<NoteChange>> {
        let storage = self.lock();
        let mut stmt = storage.connection().prepare(&format!(
            "SELECT {NOTE_COLUMNS}, changed_at FROM notes
             WHERE changed_at > ?1
             ORDER BY changed_at ASC, id ASC"
        ))?;
        let changes = stmt
            .query_map([since], |row| {
                Ok(NoteChange {
                    note: map_note_row(row)?,
                    changed_at: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(changes)
    }

    pub fn count_notes(&self, filter: NoteFilter) -> Result<usize> {
        let sql = match filter {
            NoteFilter::Active => "SELECT COUNT(*) FROM notes WHERE state = 'active'",
            NoteFilter::Trashed => "SELECT COUNT(*) FROM notes WHERE state = 'trashed'",
            NoteFilter::All => "SELECT COUNT(*) FROM notes",
        };
        let count: i64 = self.lock().connection().query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Runs an id query built by [`NoteQuery`].
    pub(crate) fn query_ids(&self, sql: &str, params: &[Value]) -> Result<Vec<String>> {
        let storage = self.lock();
        let mut stmt = storage.connection().prepare(sql)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Runs a page query built by [`NoteQuery`].
    pub(crate) fn query_notes(&self, sql: &str, params: &[Value]) -> Result<Vec<Note>> {
        let storage = self.lock();
        let mut stmt = storage.connection().prepare(sql)?;
        let notes = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), map_note_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Replaces the title and/or body of an Active note and bumps `modified_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::NotFound`] if the note does not exist and
    /// [`TkNoteError::InvalidState`] if it is Trashed; in both cases nothing
    /// is written.
    pub fn update_note(
        &self,
        note_id: &str,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<Note> {
        self.write(|tx| {
            let mut note = get_note_in(tx, note_id)?;
            if note.is_trashed() {
                return Err(TkNoteError::InvalidState(format!(
                    "Note {note_id} is in the trash and must be restored before editing"
                )));
            }

            if let Some(title) = title {
                note.title = title.to_string();
            }
            if let Some(body) = body {
                note.body = body.to_string();
            }
            // Never move modified_at backwards if the wall clock does.
            note.modified_at = now_millis().max(note.modified_at);

            tx.execute(
                "UPDATE notes SET title = ?1, body = ?2, modified_at = ?3, changed_at = ?3
                 WHERE id = ?4",
                rusqlite::params![note.title, note.body, note.modified_at, note.id],
            )?;
            Ok(note)
        })
    }

    /// Moves a note to the trash. Trashing a Trashed note changes nothing.
    pub fn mark_trashed(&self, note_id: &str) -> Result<Note> {
        let note = self.write(|tx| {
            let mut note = get_note_in(tx, note_id)?;
            if note.is_trashed() {
                return Ok(note);
            }

            let now = now_millis();
            tx.execute(
                "UPDATE notes SET state = 'trashed', trashed_at = ?1, changed_at = ?1 WHERE id = ?2",
                rusqlite::params![now, note_id],
            )?;
            note.state = NoteState::Trashed;
            note.trashed_at = Some(now);
            Ok(note)
        })?;
        log::debug!("Note {note_id} is in the trash");
        Ok(note)
    }

    /// Brings a Trashed note back to Active.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::InvalidState`] if the note is already Active.
    pub fn restore(&self, note_id: &str) -> Result<Note> {
        let note = self.write(|tx| {
            let mut note = get_note_in(tx, note_id)?;
            if !note.is_trashed() {
                return Err(TkNoteError::InvalidState(format!(
                    "Note {note_id} is not in the trash"
                )));
            }

            tx.execute(
                "UPDATE notes SET state = 'active', trashed_at = NULL, changed_at = ?1 WHERE id = ?2",
                rusqlite::params![now_millis(), note_id],
            )?;
            note.state = NoteState::Active;
            note.trashed_at = None;
            Ok(note)
        })?;
        log::debug!("Restored note {note_id}");
        Ok(note)
    }

    /// Permanently removes a note regardless of its state.
    pub fn purge(&self, note_id: &str) -> Result<()> {
        self.write(|tx| {
            tx.execute("DELETE FROM notes WHERE id = ?1", [note_id])?;
            // SQLite DELETE silently affects zero rows for unknown IDs.
            if tx.changes() == 0 {
                return Err(TkNoteError::NotFound(note_id.to_string()));
            }
            Ok(())
        })?;
        log::debug!("Purged note {note_id}");
        Ok(())
    }

    /// Purges every Trashed note whose `trashed_at` is at or before `cutoff`.
    pub fn purge_trashed_before(&self, cutoff: i64) -> Result<usize> {
        self.write(|tx| {
            let purged = tx.execute(
                "DELETE FROM notes WHERE state = 'trashed' AND trashed_at <= ?1",
                [cutoff],
            )?;
            Ok(purged)
        })
    }

    /// Purges every Trashed note.
    pub fn purge_all_trashed(&self) -> Result<usize> {
        self.write(|tx| Ok(tx.execute("DELETE FROM notes WHERE state = 'trashed'", [])?))
    }

    // ── Application state ────────────────────────────────────────

    /// Returns the saved application state, or the defaults on first launch.
    pub fn get_application_state(&self) -> Result<ApplicationState> {
        let storage = self.lock();
        let state = storage
            .connection()
            .query_row(
                "SELECT window_x, window_y, window_width, window_height, sort_mode,
                        sort_ascending, font_family, font_size, split_x, split_y,
                        selected_note_id
                 FROM app_state WHERE id = ?1",
                [APP_STATE_ROW_ID],
                |row| {
                    let sort_mode: String = row.get(4)?;
                    let split_x: Option<i32> = row.get(8)?;
                    let split_y: Option<i32> = row.get(9)?;
                    Ok(ApplicationState {
                        window_x: row.get(0)?,
                        window_y: row.get(1)?,
                        window_width: row.get(2)?,
                        window_height: row.get(3)?,
                        sort_mode: SortKey::parse(&sort_mode).unwrap_or_else(|| {
                            log::warn!("Unknown stored sort mode '{sort_mode}', using default");
                            ApplicationState::default().sort_mode
                        }),
                        sort_ascending: row.get(5)?,
                        font_family: row.get(6)?,
                        font_size: row.get(7)?,
                        split_position: split_x.zip(split_y),
                        selected_note_id: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    /// Writes the full application state as an upsert of the singleton row.
    pub fn save_application_state(&self, state: &ApplicationState) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO app_state (id, window_x, window_y, window_width, window_height,
                                        sort_mode, sort_ascending, font_family, font_size,
                                        split_x, split_y, selected_note_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    window_x = excluded.window_x,
                    window_y = excluded.window_y,
                    window_width = excluded.window_width,
                    window_height = excluded.window_height,
                    sort_mode = excluded.sort_mode,
                    sort_ascending = excluded.sort_ascending,
                    font_family = excluded.font_family,
                    font_size = excluded.font_size,
                    split_x = excluded.split_x,
                    split_y = excluded.split_y,
                    selected_note_id = excluded.selected_note_id",
                rusqlite::params![
                    APP_STATE_ROW_ID,
                    state.window_x,
                    state.window_y,
                    state.window_width,
                    state.window_height,
                    state.sort_mode.as_str(),
                    state.sort_ascending,
                    state.font_family,
                    state.font_size,
                    state.split_position.map(|(x, _)| x),
                    state.split_position.map(|(_, y)| y),
                    state.selected_note_id,
                ],
            )?;
            Ok(())
        })
    }

    /// Gives tests raw access to the connection, e.g. to simulate a broken file.
    #[cfg(test)]
    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(self.lock().connection())
    }
}

fn get_note_in(conn: &Connection, note_id: &str) -> Result<Note> {
    conn.query_row(
        &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
        [note_id],
        map_note_row,
    )
    .optional()?
    .ok_or_else(|| TkNoteError::NotFound(note_id.to_string()))
}

/// Maps a row selected with [`NOTE_COLUMNS`] into a [`Note`].
fn map_note_row(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    let state: String = row.get(5)?;
    let state = NoteState::from_column(&state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown note state '{state}'").into(),
        )
    })?;
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        created_at: row.get(3)?,
        modified_at: row.get(4)?,
        state,
        trashed_at: row.get(6)?,
    })
}

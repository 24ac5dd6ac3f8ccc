//! Window geometry, sort order and other session preferences.
//!
//! [`ApplicationState`] is a singleton record: the store keeps exactly one row
//! and every save replaces it completely. [`AppStateManager`] loads it once at
//! startup, before the GUI renders, and writes it back whenever a preference
//! changes and again at shutdown.

use crate::core::listing::{SortKey, SortSpec};
use crate::{RecordStore, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Primary key of the one and only `app_state` row.
pub const APP_STATE_ROW_ID: i64 = 1;

/// Smallest window the editor can be laid out in.
pub const MIN_WINDOW_WIDTH: i32 = 650;
pub const MIN_WINDOW_HEIGHT: i32 = 400;

/// Bounds of the font-size scale offered to the user.
pub const FONT_MIN_SIZE: i32 = 8;
pub const FONT_MAX_SIZE: i32 = 72;

pub const DEFAULT_FONT_FAMILY: &str = "Monaco";
pub const DEFAULT_FONT_SIZE: i32 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    pub window_x: i32,
    pub window_y: i32,
    pub window_width: i32,
    pub window_height: i32,
    pub sort_mode: SortKey,
    pub sort_ascending: bool,
    pub font_family: String,
    pub font_size: i32,
    /// Screen coordinate of the list/editor splitter, if the user moved it.
    pub split_position: Option<(i32, i32)>,
    pub selected_note_id: Option<String>,
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self {
            window_x: 100,
            window_y: 100,
            window_width: 1000,
            window_height: 700,
            sort_mode: SortKey::Modified,
            sort_ascending: false,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            split_position: None,
            selected_note_id: None,
        }
    }
}

impl ApplicationState {
    pub fn sort_spec(&self) -> SortSpec {
        SortSpec {
            key: self.sort_mode,
            ascending: self.sort_ascending,
        }
    }

    /// Clamps values the GUI cannot honour into their valid ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.window_width = self.window_width.max(MIN_WINDOW_WIDTH);
        self.window_height = self.window_height.max(MIN_WINDOW_HEIGHT);
        self.font_size = self.font_size.clamp(FONT_MIN_SIZE, FONT_MAX_SIZE);
        if self.font_family.trim().is_empty() {
            self.font_family = DEFAULT_FONT_FAMILY.to_string();
        }
        self
    }
}

/// Holds the live application state and persists every change.
pub struct AppStateManager {
    store: Arc<RecordStore>,
    state: ApplicationState,
}

impl AppStateManager {
    /// Loads the saved state. A store that cannot be read yields the defaults
    /// so the application can still start.
    pub fn load(store: Arc<RecordStore>) -> Self {
        let state = match store.get_application_state() {
            Ok(state) => state.normalized(),
            Err(e) => {
                log::warn!("Could not load application state, using defaults: {e}");
                ApplicationState::default()
            }
        };
        Self { store, state }
    }

    pub fn state(&self) -> &ApplicationState {
        &self.state
    }

    pub fn sort_spec(&self) -> SortSpec {
        self.state.sort_spec()
    }

    /// Applies `change` and saves the full record if anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TkNoteError::StorageUnavailable`] if the write fails.
    /// The in-memory state keeps the change, so the next save retries it.
    pub fn update<F: FnOnce(&mut ApplicationState)>(&mut self, change: F) -> Result<()> {
        let mut next = self.state.clone();
        change(&mut next);
        let next = next.normalized();
        if next == self.state {
            return Ok(());
        }
        self.state = next;
        self.save()
    }

    pub fn set_window_geometry(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
        self.update(|s| {
            s.window_x = x;
            s.window_y = y;
            s.window_width = width;
            s.window_height = height;
        })
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> Result<()> {
        self.update(|s| {
            s.sort_mode = sort.key;
            s.sort_ascending = sort.ascending;
        })
    }

    pub fn set_font(&mut self, family: &str, size: i32) -> Result<()> {
        self.update(|s| {
            s.font_family = family.to_string();
            s.font_size = size;
        })
    }

    pub fn set_split_position(&mut self, position: Option<(i32, i32)>) -> Result<()> {
        self.update(|s| s.split_position = position)
    }

    pub fn set_selected_note(&mut self, note_id: Option<&str>) -> Result<()> {
        self.update(|s| s.selected_note_id = note_id.map(str::to_string))
    }

    /// Writes the current state unconditionally (used at shutdown).
    pub fn save(&self) -> Result<()> {
        self.store.save_application_state(&self.state)?;
        log::debug!("Saved application state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn store() -> Arc<RecordStore> {
        Arc::new(RecordStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_load_fresh_store_gives_defaults() {
        let manager = AppStateManager::load(store());
        assert_eq!(manager.state(), &ApplicationState::default());
        assert_eq!(manager.sort_spec(), SortSpec::descending(SortKey::Modified));
    }

    #[test]
    fn test_geometry_and_sort_roundtrip() {
        let temp = NamedTempFile::new().unwrap();
        {
            let store = Arc::new(RecordStore::open(temp.path()).unwrap());
            let mut manager = AppStateManager::load(store);
            manager.set_window_geometry(10, 20, 800, 600).unwrap();
            manager.set_sort(SortSpec::ascending(SortKey::Title)).unwrap();
        }

        let store = Arc::new(RecordStore::open(temp.path()).unwrap());
        let manager = AppStateManager::load(store);
        let state = manager.state();
        assert_eq!(
            (state.window_x, state.window_y, state.window_width, state.window_height),
            (10, 20, 800, 600)
        );
        assert_eq!(state.sort_mode, SortKey::Title);
        assert_eq!(state.sort_mode.as_str(), "title");
        assert!(state.sort_ascending);
    }

    #[test]
    fn test_values_are_normalized() {
        let mut manager = AppStateManager::load(store());
        manager.set_window_geometry(0, 0, 100, 50).unwrap();
        manager.set_font("  ", 500).unwrap();

        let state = manager.state();
        assert_eq!(state.window_width, MIN_WINDOW_WIDTH);
        assert_eq!(state.window_height, MIN_WINDOW_HEIGHT);
        assert_eq!(state.font_family, DEFAULT_FONT_FAMILY);
        assert_eq!(state.font_size, FONT_MAX_SIZE);
    }

    #[test]
    fn test_split_position_and_selection_persist() {
        let store = store();
        let mut manager = AppStateManager::load(Arc::clone(&store));
        manager.set_split_position(Some((300, 12))).unwrap();
        manager.set_selected_note(Some("abc")).unwrap();

        let saved = store.get_application_state().unwrap();
        assert_eq!(saved.split_position, Some((300, 12)));
        assert_eq!(saved.selected_note_id.as_deref(), Some("abc"));

        manager.set_selected_note(None).unwrap();
        assert_eq!(store.get_application_state().unwrap().selected_note_id, None);
    }

    #[test]
    fn test_load_failure_falls_back_to_defaults() {
        let store = store();
        store.with_connection(|c| c.execute_batch("DROP TABLE app_state").unwrap());

        let manager = AppStateManager::load(store);
        assert_eq!(manager.state(), &ApplicationState::default());
    }

    #[test]
    fn test_failed_save_keeps_change_in_memory() {
        let store = store();
        let mut manager = AppStateManager::load(Arc::clone(&store));
        store.with_connection(|c| {
            c.execute_batch("ALTER TABLE app_state RENAME TO app_state_hidden")
                .unwrap()
        });

        let err = manager.set_font("Menlo", 14).unwrap_err();
        assert!(err.is_storage_unavailable());
        assert_eq!(manager.state().font_family, "Menlo");

        store.with_connection(|c| {
            c.execute_batch("ALTER TABLE app_state_hidden RENAME TO app_state")
                .unwrap()
        });
        manager.save().unwrap();
        assert_eq!(store.get_application_state().unwrap().font_size, 14);
    }

    #[test]
    fn test_unchanged_update_does_not_write() {
        let store = store();
        let mut manager = AppStateManager::load(Arc::clone(&store));
        manager.update(|_| {}).unwrap();

        let rows: i64 = store.with_connection(|c| {
            c.query_row("SELECT COUNT(*) FROM app_state", [], |row| row.get(0))
                .unwrap()
        });
        assert_eq!(rows, 0);
    }
}

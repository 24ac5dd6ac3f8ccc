//! Notebook configuration persistence.
//!
//! Stored as a camelCase JSON file. Every field has a default, so a partial
//! or missing file still yields a usable configuration.

use crate::core::autosave::AutosaveConfig;
use crate::core::trash::TrashConfig;
use crate::{Result, TkNoteError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default database file, relative to the working directory.
pub const DEFAULT_STORAGE_FILE: &str = "notes.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotebookConfig {
    /// Location of the SQLite database file.
    pub storage_path: PathBuf,
    pub autosave: AutosaveConfig,
    pub trash: TrashConfig,
    /// How long shutdown waits for pending autosave flushes.
    pub shutdown_timeout_ms: u64,
    /// Empty the trash as the last step of shutdown.
    pub empty_trash_on_exit: bool,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_FILE),
            autosave: AutosaveConfig::default(),
            trash: TrashConfig::default(),
            shutdown_timeout_ms: 3_000,
            empty_trash_on_exit: false,
        }
    }
}

impl NotebookConfig {
    /// Default configuration with the database at `path`.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            storage_path: path.into(),
            ..Default::default()
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Loads the configuration at `path`; returns defaults if the file is missing or corrupt.
pub fn load_config<P: AsRef<Path>>(path: P) -> NotebookConfig {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not read config {}: {e}", path.display());
            }
            return NotebookConfig::default();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        log::warn!("Ignoring corrupt config {}: {e}", path.display());
        NotebookConfig::default()
    })
}

/// Saves the configuration to `path`, creating parent directories as needed.
pub fn save_config<P: AsRef<Path>>(path: P, config: &NotebookConfig) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| TkNoteError::Config(format!("Failed to serialize config: {e}")))?;
    fs::write(path, json)?;
    Ok(())
}

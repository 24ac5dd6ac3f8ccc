//! Error types for the TkNote core library.

use thiserror::Error;

/// All errors that can occur within the TkNote core library.
#[derive(Debug, Error)]
pub enum TkNoteError {
    /// A note ID was requested that does not exist in the database.
    #[error("Note not found: {0}")]
    NotFound(String),

    /// The operation is not valid for the note's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The database file could not be opened, read or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be serialised or written.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias that pins the error type to [`TkNoteError`].
pub type Result<T> = std::result::Result<T, TkNoteError>;

impl TkNoteError {
    /// Returns `true` for failures of the backing file rather than of the request.
    ///
    /// Autosave keeps the buffer dirty and retries on the next trigger for these.
    #[must_use]
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::Io(_))
    }

    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "Note no longer exists".to_string(),
            Self::InvalidState(msg) => msg.clone(),
            Self::StorageUnavailable(e) => format!("Failed to save: {e}"),
            Self::Io(e) => format!("File error: {e}"),
            Self::Config(msg) => format!("Settings could not be saved: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_storage_unavailable() {
        let e: TkNoteError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(e.is_storage_unavailable());

        let e: TkNoteError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(e.is_storage_unavailable());

        assert!(!TkNoteError::NotFound("x".to_string()).is_storage_unavailable());
        assert!(!TkNoteError::InvalidState("x".to_string()).is_storage_unavailable());
    }

    #[test]
    fn test_user_message_for_missing_note() {
        let e = TkNoteError::NotFound("abc".to_string());
        assert_eq!(e.user_message(), "Note no longer exists");
        assert!(e.to_string().contains("abc"));
    }
}

use crate::Result;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Current on-disk schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the SQLite connection backing a TkNote database file.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens the database at `path`, creating the file, its parent
    /// directories and the schema when they do not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // journal_mode answers with a row, so it cannot go through pragma_update.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::initialise(conn)
    }

    /// Opens a private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self> {
        Self::initialise(Connection::open_in_memory()?)
    }

    fn initialise(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;

        // Validate database structure
        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type='table'
             AND name IN ('notes', 'app_state')",
            [],
            |row| row.get(0),
        )?;
        if table_count != 2 {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_NOTADB),
                Some("Not a valid TkNote database".to_string()),
            )
            .into());
        }

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Brings tables written by older versions up to the current layout.
///
/// Runs before `schema.sql` so the indexes it creates find their columns.
fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION || !column_exists(conn, "notes", "id")? {
        return Ok(());
    }

    // v1 -> v2: sync bookkeeping column.
    if !column_exists(conn, "notes", "changed_at")? {
        log::info!("Migrating notes table: adding changed_at column");
        conn.execute_batch(
            "BEGIN;
             ALTER TABLE notes ADD COLUMN changed_at INTEGER NOT NULL DEFAULT 0;
             UPDATE notes SET changed_at = MAX(modified_at, COALESCE(trashed_at, 0));
             COMMIT;",
        )?;
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get::<_, i64>(0).map(|count| count > 0),
    )?;
    Ok(exists)
}

//! SQLite connection handling
//!
//! The connection may be opened lazily: a [`Database`] created with
//! [`Database::deferred`] has no connection until [`Database::initialize`]
//! succeeds. Until then every operation fails with
//! [`StorageError::Unavailable`]; the collection layer turns that into empty
//! reads and rejected writes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::error::{StorageError, StorageResult};
use super::schema::{init_schema, needs_init};

/// Handle to the embedded record database
pub struct Database {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create the database at `path`
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let db = Self::deferred(path);
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: None,
        })
    }

    /// Create a handle whose connection is opened later
    pub fn deferred(path: impl Into<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(None),
            path: Some(path.into()),
        }
    }

    /// Open the connection if it is not open yet
    pub fn initialize(&self) -> StorageResult<()> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Ok(());
        }
        let Some(path) = self.path.as_deref() else {
            return Err(StorageError::Unavailable);
        };

        let conn = open_connection(path)?;
        info!(path = %path.display(), "record store opened");
        *guard = Some(conn);
        Ok(())
    }

    /// Whether the connection is open
    pub fn is_available(&self) -> bool {
        self.lock().is_some()
    }

    /// Location of the database file, if it lives on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the connection
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(StorageError::Unavailable),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_connection(path: &Path) -> StorageResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    if needs_init(&conn) {
        debug!("initializing record store schema");
        init_schema(&conn)?;
    }
    Ok(conn)
}

// ==================== Row helpers ====================

pub(crate) fn load_index_doc(conn: &Connection, kind: &str) -> StorageResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM indexes WHERE kind = ?",
        params![kind],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn write_index_doc(conn: &Connection, kind: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO indexes (kind, value) VALUES (?, ?)",
        params![kind, value],
    )?;
    Ok(())
}

pub(crate) fn load_record(conn: &Connection, kind: &str, id: &str) -> StorageResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM records WHERE kind = ? AND id = ?",
        params![kind, id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn upsert_record(conn: &Connection, kind: &str, id: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO records (kind, id, value) VALUES (?, ?, ?)",
        params![kind, id, value],
    )?;
    Ok(())
}

pub(crate) fn delete_record(conn: &Connection, kind: &str, id: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM records WHERE kind = ? AND id = ?",
        params![kind, id],
    )?;
    Ok(())
}

/// Every stored body of `kind`, ordered by id
pub(crate) fn all_records(conn: &Connection, kind: &str) -> StorageResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT id, value FROM records WHERE kind = ? ORDER BY id")?;
    let rows = stmt
        .query_map(params![kind], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn record_ids(conn: &Connection, kind: &str) -> StorageResult<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT id FROM records WHERE kind = ?")?;
    let ids = stmt
        .query_map(params![kind], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_deferred_is_unavailable_until_initialized() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::deferred(temp_dir.path().join("nested").join("verse.db"));

        assert!(!db.is_available());
        let err = db.with_conn(|_| Ok(())).unwrap_err();
        assert!(matches!(err, StorageError::Unavailable));

        db.initialize().unwrap();
        assert!(db.is_available());
        assert!(db.path().unwrap().exists());
    }

    #[test]
    fn test_in_memory_initialize_is_noop() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.is_available());
        assert!(db.path().is_none());
        db.initialize().unwrap();
    }

    #[test]
    fn test_row_helpers() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            upsert_record(conn, "entry", "b", "{\"n\":2}")?;
            upsert_record(conn, "entry", "a", "{\"n\":1}")?;
            upsert_record(conn, "book", "a", "{}")?;

            assert_eq!(load_record(conn, "entry", "a")?.as_deref(), Some("{\"n\":1}"));
            assert!(load_record(conn, "entry", "zzz")?.is_none());

            let all = all_records(conn, "entry")?;
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].0, "a");

            delete_record(conn, "entry", "a")?;
            let ids = record_ids(conn, "entry")?;
            assert!(ids.contains("b"));
            assert!(!ids.contains("a"));

            assert!(load_index_doc(conn, "entry")?.is_none());
            write_index_doc(conn, "entry", "{}")?;
            assert_eq!(load_index_doc(conn, "entry")?.as_deref(), Some("{}"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("verse.db");
        {
            let db = Database::open(&path).unwrap();
            db.with_conn(|conn| upsert_record(conn, "entry", "a", "{}"))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let ids = db.with_conn(|conn| record_ids(conn, "entry")).unwrap();
        assert_eq!(ids.len(), 1);
    }
}

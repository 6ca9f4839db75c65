//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex. Every open path applies
//! the same PRAGMAs (foreign keys on, so turns cannot reference unknown
//! users) and runs pending migrations.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use medchat_core::error::MedchatError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// Callers never hold the lock across an `.await`; all access goes through
/// [`Database::with_conn`], which runs a synchronous closure.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file, creating parent directories.
    pub fn new(path: &Path) -> Result<Self, MedchatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| MedchatError::Storage(format!("Failed to open database: {}", e)))?;
        let db = Self::initialize(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, MedchatError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MedchatError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, MedchatError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| MedchatError::Storage(format!("Failed to set pragmas: {}", e)))?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a closure with the underlying connection. The mutex is held
    /// for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, MedchatError>
    where
        F: FnOnce(&Connection) -> Result<T, MedchatError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MedchatError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rows(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .map_err(|e| MedchatError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_rows(&db, "users"), 0);
        assert_eq!(count_rows(&db, "chats"), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("medchat.db");
        let db = Database::new(&path).unwrap();

        assert_eq!(count_rows(&db, "chats"), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medchat.db");
        {
            let db = Database::new(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute("INSERT INTO users (username, created_at) VALUES ('ada', 0)", [])
                    .map_err(|e| MedchatError::Storage(e.to_string()))?;
                Ok(())
            })
            .unwrap();
        }
        let db = Database::new(&path).unwrap();
        assert_eq!(count_rows(&db, "users"), 1);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::in_memory().unwrap();
        let enabled: i64 = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                    .map_err(|e| MedchatError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(enabled, 1);
    }
}

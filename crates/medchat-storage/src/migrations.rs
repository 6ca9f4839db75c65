//! Database schema migrations.
//!
//! Creates the users and chats tables plus the schema_migrations ledger.
//! Migrations run automatically whenever a [`Database`](crate::Database)
//! is opened.

use rusqlite::Connection;
use tracing::info;

use medchat_core::error::MedchatError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), MedchatError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| MedchatError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| MedchatError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: users_and_chats");
    }

    Ok(())
}

/// Version 1: users and their conversation turns.
///
/// Timestamps are Unix milliseconds. Turns are never deleted; clearing a
/// conversation sets `is_deleted`.
fn apply_v1(conn: &Connection) -> Result<(), MedchatError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chats (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL,
            message     TEXT NOT NULL,
            response    TEXT NOT NULL,
            timestamp   INTEGER NOT NULL,
            is_deleted  INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_chats_user_timestamp
            ON chats (user_id, timestamp DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'users_and_chats');
        ",
    )
    .map_err(|e| MedchatError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_tables_exist() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        assert!(table_exists(&conn, "users"));
        assert!(table_exists(&conn, "chats"));
    }

    #[test]
    fn test_chats_reject_unknown_user() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO chats (user_id, message, response, timestamp) VALUES (42, 'hi', 'hello', 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_is_deleted_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO users (username, created_at) VALUES ('u', 0)", [])
            .unwrap();

        let result = conn.execute(
            "INSERT INTO chats (user_id, message, response, timestamp, is_deleted)
             VALUES (1, 'hi', 'hello', 0, 2)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_username_unique() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO users (username, created_at) VALUES ('u', 0)", [])
            .unwrap();
        let dup = conn.execute("INSERT INTO users (username, created_at) VALUES ('u', 0)", []);
        assert!(dup.is_err());
    }
}

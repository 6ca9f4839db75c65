//! Repositories over the SQLite database.
//!
//! `TurnStore` is the interface the chat pipeline depends on; `TurnRepository`
//! is its SQLite implementation. `UserRepository` manages the users that
//! turns belong to.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{ErrorCode, OptionalExtension};
use tracing::{debug, info};

use medchat_core::error::MedchatError;
use medchat_core::types::{ConversationTurn, User, UserId};

use crate::db::Database;

/// Append-only conversation log, keyed by user.
pub trait TurnStore: Send + Sync {
    /// Record a completed exchange. Fails with
    /// [`MedchatError::InvalidReference`] when `user_id` does not exist.
    fn append_turn(
        &self,
        user_id: UserId,
        message: &str,
        response: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ConversationTurn, MedchatError>;

    /// Up to `limit` non-deleted turns, newest first.
    fn fetch_recent_turns(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MedchatError>;

    /// Soft-delete every live turn for the user. Returns the number marked.
    fn mark_all_deleted(&self, user_id: UserId) -> Result<usize, MedchatError>;

    /// All non-deleted turns, oldest first.
    fn fetch_history(&self, user_id: UserId) -> Result<Vec<ConversationTurn>, MedchatError>;
}

// =============================================================================
// TurnRepository
// =============================================================================

/// SQLite-backed [`TurnStore`].
pub struct TurnRepository {
    db: Arc<Database>,
}

const TURN_COLUMNS: &str = "id, user_id, message, response, timestamp, is_deleted";

impl TurnRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn query_turns(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ConversationTurn>, MedchatError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| MedchatError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(params, |row| Ok(row_to_turn(row)))
                .map_err(|e| MedchatError::Storage(e.to_string()))?;

            let mut turns = Vec::new();
            for row in rows {
                turns.push(row.map_err(|e| MedchatError::Storage(e.to_string()))??);
            }
            Ok(turns)
        })
    }
}

impl TurnStore for TurnRepository {
    fn append_turn(
        &self,
        user_id: UserId,
        message: &str,
        response: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ConversationTurn, MedchatError> {
        // Stored at millisecond precision; return what a later read sees.
        let timestamp = millis_to_datetime(timestamp.timestamp_millis())?;
        self.db.with_conn(|conn| {
            // Dropping the transaction without commit rolls it back.
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| MedchatError::Storage(format!("Failed to begin transaction: {}", e)))?;

            tx.execute(
                "INSERT INTO chats (user_id, message, response, timestamp, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                rusqlite::params![user_id, message, response, timestamp.timestamp_millis()],
            )
            .map_err(|e| map_write_error(e, user_id))?;
            let id = tx.last_insert_rowid();

            tx.commit()
                .map_err(|e| MedchatError::Storage(format!("Failed to commit turn: {}", e)))?;

            debug!(user_id, turn_id = id, "Appended conversation turn");
            Ok(ConversationTurn {
                id,
                user_id,
                message: message.to_string(),
                response: response.to_string(),
                timestamp,
                is_deleted: false,
            })
        })
    }

    fn fetch_recent_turns(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MedchatError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_turns(
            &format!(
                "SELECT {} FROM chats
                 WHERE user_id = ?1 AND is_deleted = 0
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
                TURN_COLUMNS
            ),
            &[&user_id, &limit],
        )
    }

    fn mark_all_deleted(&self, user_id: UserId) -> Result<usize, MedchatError> {
        let marked = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET is_deleted = 1 WHERE user_id = ?1 AND is_deleted = 0",
                rusqlite::params![user_id],
            )
            .map_err(|e| MedchatError::Storage(format!("Failed to clear turns: {}", e)))
        })?;
        info!(user_id, marked, "Conversation history marked as cleared");
        Ok(marked)
    }

    fn fetch_history(&self, user_id: UserId) -> Result<Vec<ConversationTurn>, MedchatError> {
        self.query_turns(
            &format!(
                "SELECT {} FROM chats
                 WHERE user_id = ?1 AND is_deleted = 0
                 ORDER BY timestamp ASC, id ASC",
                TURN_COLUMNS
            ),
            &[&user_id],
        )
    }
}

// =============================================================================
// UserRepository
// =============================================================================

/// Repository for registered users.
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a new user. Usernames are unique.
    pub fn create(&self, username: &str) -> Result<User, MedchatError> {
        let created_at = Utc::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
                rusqlite::params![username, created_at.timestamp_millis()],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => {
                    MedchatError::Storage(format!("Username '{}' already exists", username))
                }
                _ => MedchatError::Storage(format!("Failed to create user: {}", e)),
            })?;

            Ok(User {
                id: conn.last_insert_rowid(),
                username: username.to_string(),
                created_at,
            })
        })
    }

    pub fn find_by_id(&self, id: UserId) -> Result<Option<User>, MedchatError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| MedchatError::Storage(e.to_string()))?
            .map(|(id, username, created_ms)| -> Result<User, MedchatError> {
                Ok(User {
                    id,
                    username,
                    created_at: millis_to_datetime(created_ms)?,
                })
            })
            .transpose()
        })
    }

    pub fn exists(&self, id: UserId) -> Result<bool, MedchatError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                rusqlite::params![id],
                |row| row.get::<_, bool>(0),
            )
            .map_err(|e| MedchatError::Storage(e.to_string()))
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Foreign key violations mean the user does not exist.
fn map_write_error(err: rusqlite::Error, user_id: UserId) -> MedchatError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
            return MedchatError::InvalidReference(format!("Unknown user id {}", user_id));
        }
    }
    MedchatError::Storage(format!("Failed to append turn: {}", err))
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, MedchatError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| MedchatError::Storage(format!("Invalid timestamp: {}", ms)))
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> Result<ConversationTurn, MedchatError> {
    let get_err = |e: rusqlite::Error| MedchatError::Storage(e.to_string());
    let timestamp_ms: i64 = row.get(4).map_err(get_err)?;
    let is_deleted: i64 = row.get(5).map_err(get_err)?;

    Ok(ConversationTurn {
        id: row.get(0).map_err(get_err)?,
        user_id: row.get(1).map_err(get_err)?,
        message: row.get(2).map_err(get_err)?,
        response: row.get(3).map_err(get_err)?,
        timestamp: millis_to_datetime(timestamp_ms)?,
        is_deleted: is_deleted != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_db() -> Arc<Database> {
        Arc::new(Database::in_memory().unwrap())
    }

    fn make_user(db: &Arc<Database>, name: &str) -> UserId {
        UserRepository::new(db.clone()).create(name).unwrap().id
    }

    fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(offset_secs)
    }

    // ---- TurnRepository ----

    #[test]
    fn test_append_and_fetch_recent() {
        let db = make_db();
        let user = make_user(&db, "ada");
        let repo = TurnRepository::new(db);

        let turn = repo.append_turn(user, "I have a cough", "<p>Rest.</p>", at(0)).unwrap();
        assert!(turn.id > 0);
        assert!(!turn.is_deleted);

        let recent = repo.fetch_recent_turns(user, 5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0], turn);
    }

    #[test]
    fn test_fetch_recent_is_newest_first_and_limited() {
        let db = make_db();
        let user = make_user(&db, "ada");
        let repo = TurnRepository::new(db);

        for i in 0..7 {
            repo.append_turn(user, &format!("m{}", i), &format!("r{}", i), at(i))
                .unwrap();
        }

        let recent = repo.fetch_recent_turns(user, 5).unwrap();
        let messages: Vec<&str> = recent.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["m6", "m5", "m4", "m3", "m2"]);
    }

    #[test]
    fn test_fetch_recent_ties_broken_by_insertion_order() {
        let db = make_db();
        let user = make_user(&db, "ada");
        let repo = TurnRepository::new(db);

        repo.append_turn(user, "first", "a", at(0)).unwrap();
        repo.append_turn(user, "second", "b", at(0)).unwrap();

        let recent = repo.fetch_recent_turns(user, 2).unwrap();
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[1].message, "first");
    }

    #[test]
    fn test_fetch_recent_zero_limit() {
        let db = make_db();
        let user = make_user(&db, "ada");
        let repo = TurnRepository::new(db);
        repo.append_turn(user, "m", "r", at(0)).unwrap();
        assert!(repo.fetch_recent_turns(user, 0).unwrap().is_empty());
    }

    #[test]
    fn test_turns_are_per_user() {
        let db = make_db();
        let ada = make_user(&db, "ada");
        let bob = make_user(&db, "bob");
        let repo = TurnRepository::new(db);

        repo.append_turn(ada, "ada msg", "r", at(0)).unwrap();
        repo.append_turn(bob, "bob msg", "r", at(1)).unwrap();

        let recent = repo.fetch_recent_turns(ada, 5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "ada msg");
    }

    #[test]
    fn test_append_unknown_user_is_invalid_reference() {
        let repo = TurnRepository::new(make_db());
        let result = repo.append_turn(999, "hello", "hi", at(0));
        assert!(matches!(result, Err(MedchatError::InvalidReference(_))));
        assert!(repo.fetch_history(999).unwrap().is_empty());
    }

    #[test]
    fn test_mark_all_deleted_hides_turns() {
        let db = make_db();
        let user = make_user(&db, "ada");
        let repo = TurnRepository::new(db);

        repo.append_turn(user, "a", "1", at(0)).unwrap();
        repo.append_turn(user, "b", "2", at(1)).unwrap();

        assert_eq!(repo.mark_all_deleted(user).unwrap(), 2);
        assert!(repo.fetch_recent_turns(user, 5).unwrap().is_empty());
        assert!(repo.fetch_history(user).unwrap().is_empty());

        // Already-cleared turns are not counted again.
        assert_eq!(repo.mark_all_deleted(user).unwrap(), 0);

        repo.append_turn(user, "c", "3", at(2)).unwrap();
        let recent = repo.fetch_recent_turns(user, 5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "c");
    }

    #[test]
    fn test_mark_all_deleted_keeps_rows() {
        let db = make_db();
        let user = make_user(&db, "ada");
        let repo = TurnRepository::new(db.clone());
        repo.append_turn(user, "a", "1", at(0)).unwrap();
        repo.mark_all_deleted(user).unwrap();

        let total: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM chats WHERE is_deleted = 1", [], |row| {
                    row.get(0)
                })
                .map_err(|e| MedchatError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_fetch_history_is_chronological() {
        let db = make_db();
        let user = make_user(&db, "ada");
        let repo = TurnRepository::new(db);

        repo.append_turn(user, "later", "r", at(10)).unwrap();
        repo.append_turn(user, "earlier", "r", at(5)).unwrap();

        let history = repo.fetch_history(user).unwrap();
        let messages: Vec<&str> = history.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["earlier", "later"]);
        assert_eq!(history[0].timestamp, at(5));
    }

    // ---- UserRepository ----

    #[test]
    fn test_user_create_and_find() {
        let repo = UserRepository::new(make_db());
        let user = repo.create("ada").unwrap();

        let found = repo.find_by_id(user.id).unwrap().unwrap();
        assert_eq!(found.username, "ada");
        assert_eq!(
            found.created_at.timestamp_millis(),
            user.created_at.timestamp_millis()
        );
        assert!(repo.exists(user.id).unwrap());
    }

    #[test]
    fn test_user_find_nonexistent() {
        let repo = UserRepository::new(make_db());
        assert!(repo.find_by_id(42).unwrap().is_none());
        assert!(!repo.exists(42).unwrap());
    }

    #[test]
    fn test_user_duplicate_username() {
        let repo = UserRepository::new(make_db());
        repo.create("ada").unwrap();
        let err = repo.create("ada").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}

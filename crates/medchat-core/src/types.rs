use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a registered user.
pub type UserId = i64;

// =============================================================================
// Conversation
// =============================================================================

/// One persisted user message plus the assistant response to it.
///
/// Turns are append-only: the only mutation ever applied is the soft-delete
/// flag set when a user clears their history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub user_id: UserId,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub is_deleted: bool,
}

/// A registered user. Only the identity matters to the chat pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Classification
// =============================================================================

/// Outcome of scoring a message against the reference term corpus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// True when at least one term scored strictly above the threshold.
    pub is_relevant: bool,
    /// Highest similarity observed, `None` when nothing was scored.
    pub max_score: Option<f32>,
    /// Phrase that produced `max_score`.
    pub best_term: Option<String>,
}

impl ClassificationResult {
    /// The result used whenever classification is impossible.
    pub fn not_relevant() -> Self {
        Self {
            is_relevant: false,
            max_score: None,
            best_term: None,
        }
    }
}

//! Chat orchestrator: the end-to-end turn pipeline.
//!
//! blank check -> relevance gate -> prompt assembly -> remote completion
//! -> sanitize -> persist. The remote call is the only suspension point;
//! storage is touched synchronously before and after it.

use std::sync::Arc;

use chrono::Utc;
use medchat_core::error::MedchatError;
use medchat_core::types::{ConversationTurn, UserId};
use medchat_storage::TurnStore;
use medchat_vector::RelevanceClassifier;
use tracing::{error, info, warn};

use crate::completion::{CompletionFailure, CompletionService};
use crate::context::ContextAssembler;
use crate::error::ChatError;
use crate::sanitize::ResponseSanitizer;

pub const INVALID_INPUT_TEXT: &str = "Please enter a valid message.";
pub const OFF_TOPIC_TEXT: &str = "I can only help with health and medical questions. \
Please describe your symptoms or medical concern and I'll do my best to help.";
pub const FALLBACK_TEXT: &str = "Sorry, I couldn't process your request.";
pub const ERROR_TEXT: &str = "Sorry, an error occurred. Please try again.";
pub const CLEARED_TEXT: &str = "Chat history has been cleared. How can I assist you now?";
pub const UNKNOWN_USER_TEXT: &str = "Invalid user ID, please log in or register.";
pub const PERSISTENCE_FAILURE_TEXT: &str = "Failed to log error message.";

/// How a turn was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyKind {
    /// Blank message; nothing else ran.
    InvalidInput,
    /// Not a medical question; nothing was persisted.
    OffTopic,
    /// The model answered and the turn was stored.
    Answered,
    /// The model failed; the apology was stored in its place.
    Fallback(CompletionFailure),
    /// Storing the turn failed; an error record was stored instead.
    Failed,
}

impl ReplyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::OffTopic => "off_topic",
            Self::Answered => "answered",
            Self::Fallback(_) => "fallback",
            Self::Failed => "failed",
        }
    }
}

/// The reply to one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    /// Sanitized text shown to the user.
    pub text: String,
    pub kind: ReplyKind,
    /// The stored record, when one was written.
    pub turn: Option<ConversationTurn>,
}

impl TurnReply {
    fn unsaved(text: &str, kind: ReplyKind) -> Self {
        Self {
            text: text.to_string(),
            kind,
            turn: None,
        }
    }
}

/// Composes classifier, context, completion, sanitizer and storage.
pub struct ChatOrchestrator {
    classifier: RelevanceClassifier,
    context: ContextAssembler,
    completion: Arc<dyn CompletionService>,
    sanitizer: ResponseSanitizer,
    store: Arc<dyn TurnStore>,
}

impl ChatOrchestrator {
    pub fn new(
        classifier: RelevanceClassifier,
        store: Arc<dyn TurnStore>,
        completion: Arc<dyn CompletionService>,
        sanitizer: ResponseSanitizer,
        max_turns: usize,
    ) -> Self {
        Self {
            classifier,
            context: ContextAssembler::new(store.clone(), max_turns),
            completion,
            sanitizer,
            store,
        }
    }

    pub fn classifier(&self) -> &RelevanceClassifier {
        &self.classifier
    }

    /// Handle one user message end to end.
    ///
    /// Only an unknown user or a storage failure that cannot itself be
    /// recorded is returned as an error; every other outcome is a reply.
    pub async fn handle_turn(&self, user_id: UserId, message: &str) -> Result<TurnReply, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(TurnReply::unsaved(INVALID_INPUT_TEXT, ReplyKind::InvalidInput));
        }

        if !self.classifier.is_relevant(message).await {
            info!(user_id, message_len = message.len(), "Message classified as non-medical");
            return Ok(TurnReply::unsaved(OFF_TOPIC_TEXT, ReplyKind::OffTopic));
        }

        let prompt = match self.context.build_prompt(user_id, message) {
            Ok(prompt) => prompt,
            Err(e) => return self.record_failure(user_id, message, "context", e),
        };

        let (raw, kind) = match self.completion.complete(&prompt).await {
            Ok(text) => (text, ReplyKind::Answered),
            Err(failure) => {
                warn!(
                    user_id,
                    stage = "completion",
                    message_len = message.len(),
                    reason = failure.code(),
                    "Completion failed; replying with fallback"
                );
                (FALLBACK_TEXT.to_string(), ReplyKind::Fallback(failure))
            }
        };
        let response = self.sanitizer.sanitize(&raw);

        match self.store.append_turn(user_id, message, &response, Utc::now()) {
            Ok(turn) => {
                info!(
                    user_id,
                    turn_id = turn.id,
                    kind = kind.as_str(),
                    "Chat turn processed"
                );
                Ok(TurnReply {
                    text: response,
                    kind,
                    turn: Some(turn),
                })
            }
            Err(MedchatError::InvalidReference(reason)) => {
                error!(
                    user_id,
                    stage = "persist",
                    message_len = message.len(),
                    reason = %reason,
                    "Turn references unknown user"
                );
                Err(ChatError::UnknownUser(user_id))
            }
            Err(e) => self.record_failure(user_id, message, "persist", e),
        }
    }

    /// Store an error record in place of the failed exchange.
    fn record_failure(
        &self,
        user_id: UserId,
        message: &str,
        stage: &'static str,
        cause: MedchatError,
    ) -> Result<TurnReply, ChatError> {
        error!(
            user_id,
            stage,
            message_len = message.len(),
            error = %cause,
            "Chat turn failed; recording error reply"
        );

        let text = self.sanitizer.sanitize(ERROR_TEXT);
        match self.store.append_turn(user_id, message, &text, Utc::now()) {
            Ok(turn) => Ok(TurnReply {
                text,
                kind: ReplyKind::Failed,
                turn: Some(turn),
            }),
            Err(e) => {
                error!(
                    user_id,
                    stage = "record_failure",
                    message_len = message.len(),
                    error = %e,
                    "Failed to record error reply"
                );
                Err(ChatError::Persistence(e.to_string()))
            }
        }
    }

    /// Soft-delete the user's conversation.
    pub fn clear_history(&self, user_id: UserId) -> Result<&'static str, ChatError> {
        self.store.mark_all_deleted(user_id)?;
        Ok(CLEARED_TEXT)
    }

    /// Live turns, oldest first, with responses sanitized again for display.
    pub fn history(&self, user_id: UserId) -> Result<Vec<ConversationTurn>, ChatError> {
        let mut turns = self.store.fetch_history(user_id)?;
        for turn in &mut turns {
            turn.response = self.sanitizer.sanitize(&turn.response);
        }
        Ok(turns)
    }
}

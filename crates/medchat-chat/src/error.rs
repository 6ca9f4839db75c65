//! Error types for the conversational pipeline.

use medchat_core::error::MedchatError;
use medchat_core::types::UserId;

/// Errors the orchestrator cannot turn into a reply.
///
/// Ordinary failures (remote call errors, a failed write that could still
/// be logged) become a [`TurnReply`](crate::TurnReply); only these reach
/// the request layer.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The user does not exist; nothing was persisted.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
    /// Persisting the turn failed and so did recording the failure.
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<MedchatError> for ChatError {
    fn from(err: MedchatError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::UnknownUser(7).to_string(), "unknown user: 7");
        assert_eq!(
            ChatError::Persistence("disk full".to_string()).to_string(),
            "persistence failed: disk full"
        );
        assert_eq!(
            ChatError::Storage("locked".to_string()).to_string(),
            "storage error: locked"
        );
    }

    #[test]
    fn test_chat_error_from_medchat_error() {
        let err: ChatError = MedchatError::Storage("connection lost".to_string()).into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert!(err.to_string().contains("connection lost"));
    }
}

//! Prompt assembly from stored conversation turns.

use std::sync::Arc;

use medchat_core::error::MedchatError;
use medchat_core::types::{ConversationTurn, UserId};
use medchat_storage::TurnStore;

/// Instruction appended after the user's message in every prompt.
pub const PROMPT_NOTE: &str = "Note: The user is seeking help for a medical concern. \
Please analyze the unique condition mentioned and tailor your advice accordingly.";

/// Default number of prior turns included in a prompt.
pub const DEFAULT_MAX_TURNS: usize = 5;

/// Builds the prompt sent to the completion endpoint.
///
/// The prompt holds the user's most recent live turns in chronological
/// order, then the new message, then [`PROMPT_NOTE`]:
///
/// ```text
/// User: <older message>
/// AI: <older response>
/// User: <new message>
/// Note: ...
/// ```
pub struct ContextAssembler {
    store: Arc<dyn TurnStore>,
    max_turns: usize,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn TurnStore>, max_turns: usize) -> Self {
        Self { store, max_turns }
    }

    /// Read the user's recent turns and render the prompt.
    pub fn build_prompt(&self, user_id: UserId, new_message: &str) -> Result<String, MedchatError> {
        let mut turns = self.store.fetch_recent_turns(user_id, self.max_turns)?;
        // Storage returns newest first.
        turns.reverse();
        Ok(render_prompt(&turns, new_message))
    }
}

/// Render turns (oldest first) and the new message into a prompt.
pub fn render_prompt(turns: &[ConversationTurn], new_message: &str) -> String {
    let mut lines = Vec::with_capacity(turns.len() * 2 + 2);
    for turn in turns {
        lines.push(format!("User: {}", turn.message));
        lines.push(format!("AI: {}", turn.response));
    }
    lines.push(format!("User: {}", new_message));
    lines.push(PROMPT_NOTE.to_string());
    lines.join("\n")
}

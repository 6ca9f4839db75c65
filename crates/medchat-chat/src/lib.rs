//! Conversational pipeline for medchat.
//!
//! Builds prompts from stored conversation turns, calls the remote
//! chat-completion endpoint, sanitizes the returned markup, and composes
//! these steps behind the relevance gate in [`ChatOrchestrator`].

pub mod completion;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod sanitize;

pub use completion::{CompletionClient, CompletionFailure, CompletionService, DEFAULT_SYSTEM_PROMPT};
pub use context::ContextAssembler;
pub use error::ChatError;
pub use orchestrator::{ChatOrchestrator, ReplyKind, TurnReply};
pub use sanitize::ResponseSanitizer;

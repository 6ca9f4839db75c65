//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use medchat_chat::ChatOrchestrator;
use medchat_core::config::MedchatConfig;
use medchat_storage::{Database, UserRepository};

/// Shared application state.
///
/// Every field is immutable after startup and behind `Arc`, so cloning
/// per request is cheap and handlers never contend on a lock here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MedchatConfig>,
    pub users: Arc<UserRepository>,
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: MedchatConfig,
        database: Arc<Database>,
        orchestrator: ChatOrchestrator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            users: Arc::new(UserRepository::new(database)),
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}

//! Shared configuration, error taxonomy, and data types for medchat.

pub mod config;
pub mod error;
pub mod types;

pub use config::MedchatConfig;
pub use error::{MedchatError, Result};
pub use types::*;

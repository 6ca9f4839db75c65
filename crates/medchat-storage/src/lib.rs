//! medchat storage crate - SQLite persistence for users and conversation turns.
//!
//! Provides a WAL-mode SQLite database with migrations, the `TurnStore`
//! interface the chat pipeline reads context from and appends turns to,
//! and a small user repository backing the turn table's foreign key.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{TurnRepository, TurnStore, UserRepository};

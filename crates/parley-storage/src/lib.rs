//! Parley Storage - Database access for the messaging core
//!
//! PostgreSQL repositories for webhook events, conversations, messages,
//! campaigns, templates and auto-response rules, plus an in-memory store
//! with the same traits for tests and local runs.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;

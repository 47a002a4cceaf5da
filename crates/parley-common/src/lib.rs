//! Parley Common - Shared types and utilities
//!
//! This crate provides the configuration, error type, identifiers and
//! metadata key contract shared by every Parley component.

pub mod config;
pub mod error;
pub mod metadata;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};

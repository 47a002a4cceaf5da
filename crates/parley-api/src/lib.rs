//! Parley API - HTTP server surface
//!
//! This crate exposes the Meta webhook endpoint, the authenticated campaign
//! and conversation API, health checks and Prometheus metrics.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::{cors_layer, create_router};

//! Webhook Module - Meta webhook verification, payload types and ingestion

mod gateway;
pub mod payload;
pub mod signature;

pub use gateway::{IngestOutcome, WebhookError, WebhookGateway};
pub use payload::{RoutedChange, WebhookPayload};
pub use signature::SIGNATURE_HEADER;

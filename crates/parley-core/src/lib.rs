//! Parley Core - Webhook ingestion and messaging pipeline
//!
//! Verifies and deduplicates provider webhooks, routes their changes to the
//! per-platform handlers, classifies inbound text, sends auto-responses,
//! runs broadcast campaigns and reconciles delivery statuses.

pub mod auto_response;
pub mod broadcast;
pub mod delivery;
pub mod intent;
pub mod metrics;
pub mod platform;
pub mod router;
pub mod webhook;

pub use auto_response::{AutoResponder, ConversationTagger};
pub use broadcast::{
    CampaignError, CampaignManager, CampaignRunResult, CampaignScheduler, ExecuteOptions,
    TokenBucket,
};
pub use delivery::{CampaignDeliveryStats, DeliveryTracker};
pub use intent::{Classification, Intent, IntentClassifier, SuggestedAction};
pub use metrics::Metrics;
pub use platform::{
    AdapterError, ChannelClients, CredentialResolver, ExternalSync, GraphApiClient,
    GraphChannelClients, NoopExternalSync, PlatformSendAdapter, SendReceipt, StaticCredentials,
};
pub use router::{EventRouter, RouteSummary, RouterError};
pub use webhook::{IngestOutcome, WebhookError, WebhookGateway};

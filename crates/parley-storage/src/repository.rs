//! Repository layer for data access

pub mod campaigns;
pub mod channels;
pub mod conversations;
pub mod messages;
pub mod rules;
pub mod templates;
pub mod webhook_events;

use std::sync::Arc;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;

// Re-export repository traits
pub use campaigns::CampaignRepository;
pub use channels::ChannelRepository;
pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
pub use rules::AutoResponseRuleRepository;
pub use templates::TemplateRepository;
pub use webhook_events::WebhookEventRepository;

// Re-export PostgreSQL implementations
pub use campaigns::DbCampaignRepository;
pub use channels::DbChannelRepository;
pub use conversations::DbConversationRepository;
pub use messages::DbMessageRepository;
pub use rules::DbAutoResponseRuleRepository;
pub use templates::DbTemplateRepository;
pub use webhook_events::DbWebhookEventRepository;

/// Every repository the messaging core needs, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub rules: Arc<dyn AutoResponseRuleRepository>,
}

impl Stores {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            webhook_events: Arc::new(DbWebhookEventRepository::new(pool.clone())),
            channels: Arc::new(DbChannelRepository::new(pool.clone())),
            conversations: Arc::new(DbConversationRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool.clone())),
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            templates: Arc::new(DbTemplateRepository::new(pool.clone())),
            rules: Arc::new(DbAutoResponseRuleRepository::new(pool)),
        }
    }

    /// All repositories backed by one shared [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            webhook_events: store.clone(),
            channels: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            campaigns: store.clone(),
            templates: store.clone(),
            rules: store,
        }
    }
}

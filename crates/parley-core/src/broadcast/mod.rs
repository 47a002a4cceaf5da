//! Broadcast Module - Campaign management and rate-limited batch sends

mod manager;
mod rate_limiter;
mod scheduler;

pub use manager::{
    CampaignError, CampaignManager, CampaignRunResult, ExecuteOptions, RecipientError,
};
pub use rate_limiter::TokenBucket;
pub use scheduler::CampaignScheduler;

//! Auto-response Module - Rule and intent driven replies, conversation tagging

mod dispatcher;
mod tagger;

pub use dispatcher::{AutoResponder, ResolvedResponse};
pub use tagger::{classification_update, priority_for, sentiment_for, ConversationTagger};

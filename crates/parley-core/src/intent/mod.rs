//! Intent Module - Classification of inbound message text

mod classifier;

pub use classifier::{Classification, Intent, IntentClassifier, SuggestedAction};

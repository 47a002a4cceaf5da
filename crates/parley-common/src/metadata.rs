//! Metadata key contract
//!
//! Conversations and messages carry an open JSON metadata bag. The keys below
//! are the ones Parley itself reads and writes; anything else in the bag is
//! left untouched.

use serde_json::{Map, Value};

/// Intent assigned by the last classification (conversation)
pub const LAST_INTENT: &str = "lastIntent";

/// Confidence of the last classification (conversation)
pub const LAST_CONFIDENCE: &str = "lastConfidence";

/// Suggested action of the last classification (conversation)
pub const SUGGESTED_ACTION: &str = "suggestedAction";

/// RFC 3339 time of the last classification (conversation)
pub const CLASSIFIED_AT: &str = "classifiedAt";

/// Set on outbound messages produced by the auto-responder
pub const AUTO_RESPONSE: &str = "autoResponse";

/// Id of the auto-response rule that produced a message
pub const RULE_ID: &str = "ruleId";

/// Campaign an outbound message belongs to
pub const CAMPAIGN_ID: &str = "campaignId";

/// Key under which a delivery status timestamp is stored, e.g. `delivered_at`.
pub fn status_at_key(status: &str) -> String {
    format!("{}_at", status)
}

/// Merge `patch` into `target`, replacing keys present in both.
///
/// A non-object `target` is replaced by an empty object first.
pub fn merge(target: &mut Value, patch: &Map<String, Value>) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Some(obj) = target.as_object_mut() {
        for (key, value) in patch {
            obj.insert(key.clone(), value.clone());
        }
    }
}

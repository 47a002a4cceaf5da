//! Rule-based intent classification
//!
//! Each category has a fixed confidence and a group of case-insensitive
//! patterns. The matching category with the highest confidence wins; equal
//! confidences resolve to the category declared first.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Intent assigned to an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PurchaseIntent,
    PricingInquiry,
    AppointmentBooking,
    SupportRequest,
    Complaint,
    PositiveFeedback,
    OptOut,
    Greeting,
    GeneralInquiry,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PurchaseIntent => "purchase_intent",
            Intent::PricingInquiry => "pricing_inquiry",
            Intent::AppointmentBooking => "appointment_booking",
            Intent::SupportRequest => "support_request",
            Intent::Complaint => "complaint",
            Intent::PositiveFeedback => "positive_feedback",
            Intent::OptOut => "opt_out",
            Intent::Greeting => "greeting",
            Intent::GeneralInquiry => "general_inquiry",
            Intent::Unknown => "unknown",
        }
    }

    /// Next step for a message with this intent
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Intent::Complaint | Intent::SupportRequest | Intent::AppointmentBooking => {
                SuggestedAction::EscalateHuman
            }
            Intent::PositiveFeedback | Intent::OptOut | Intent::Greeting => {
                SuggestedAction::AutoRespond
            }
            Intent::PurchaseIntent | Intent::PricingInquiry | Intent::GeneralInquiry => {
                SuggestedAction::AiGenerate
            }
            Intent::Unknown => SuggestedAction::Ignore,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline should do with a classified message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    AutoRespond,
    EscalateHuman,
    AiGenerate,
    Ignore,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::AutoRespond => "auto_respond",
            SuggestedAction::EscalateHuman => "escalate_human",
            SuggestedAction::AiGenerate => "ai_generate",
            SuggestedAction::Ignore => "ignore",
        }
    }
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    /// In `[0, 1]`
    pub confidence: f64,
    pub suggested_action: SuggestedAction,
    pub reasoning: String,
}

impl Classification {
    fn new(intent: Intent, confidence: f64, reasoning: String) -> Self {
        Self {
            intent,
            confidence,
            suggested_action: intent.suggested_action(),
            reasoning,
        }
    }
}

/// Categories in declaration order, with their fixed confidence and patterns
const CATEGORIES: &[(Intent, f64, &[&str])] = &[
    (
        Intent::PurchaseIntent,
        0.85,
        &[
            r"\b(buy|buying|purchase|order|ordering)\b",
            r"\b(i want|i'd like|i would like|interested in)\b",
            r"\b(add to cart|checkout|check out|in stock|ship to)\b",
        ],
    ),
    (
        Intent::PricingInquiry,
        0.80,
        &[
            r"\b(price|prices|pricing|cost|costs|fee|fees)\b",
            r"\bhow much\b",
            r"\b(discount|promo|coupon|quote|cheaper)\b",
        ],
    ),
    (
        Intent::AppointmentBooking,
        0.80,
        &[
            r"\b(appointment|booking|reservation|reserve)\b",
            r"\b(book|schedule)\b.*\b(slot|time|visit|call|meeting|table|session)\b",
            r"\b(available|availability)\b.*\b(today|tomorrow|monday|tuesday|wednesday|thursday|friday|saturday|sunday|week)\b",
        ],
    ),
    (
        Intent::SupportRequest,
        0.80,
        &[
            r"\b(help|support|assist|assistance)\b",
            r"\b(issue|problem|error|bug|broken)\b",
            r"\b(not working|doesn't work|does not work|can't|cannot|unable to)\b",
            r"\b(track|tracking)\b.*\border\b",
        ],
    ),
    (
        Intent::Complaint,
        0.85,
        &[
            r"\b(terrible|awful|horrible|worst|useless|unacceptable)\b",
            r"\b(angry|disappointed|frustrated|furious)\b",
            r"\b(refund|complain|complaint|scam|never again)\b",
        ],
    ),
    (
        Intent::PositiveFeedback,
        0.75,
        &[
            r"\b(thank you|thanks|thx|appreciate)\b",
            r"\b(great|awesome|amazing|excellent|perfect|wonderful|fantastic|love it|loved it)\b",
        ],
    ),
    (
        Intent::OptOut,
        0.95,
        &[
            r"^\s*(stop|unsubscribe|cancel|end|quit)\s*[.!]*\s*$",
            r"\b(unsubscribe|opt out|opt-out|remove me|stop messaging|stop sending)\b",
        ],
    ),
    (
        Intent::Greeting,
        0.70,
        &[
            r"^\s*(hi|hello|hey|hiya|hola|yo|greetings)\b",
            r"^\s*good (morning|afternoon|evening)\b",
        ],
    ),
];

const FALLBACK_CONFIDENCE: f64 = 0.5;

struct CompiledCategory {
    intent: Intent,
    confidence: f64,
    patterns: Vec<Regex>,
}

/// Intent classifier with patterns compiled once
pub struct IntentClassifier {
    categories: Vec<CompiledCategory>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        let categories = CATEGORIES
            .iter()
            .map(|(intent, confidence, patterns)| CompiledCategory {
                intent: *intent,
                confidence: *confidence,
                patterns: patterns
                    .iter()
                    .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            warn!(intent = %intent, pattern = p, error = %e, "Invalid intent pattern");
                            None
                        }
                    })
                    .collect(),
            })
            .collect();

        Self { categories }
    }

    /// Classify a message body. Pure: equal input gives equal output.
    pub fn classify(&self, text: &str) -> Classification {
        let text = text.trim();
        if text.is_empty() {
            return Classification::new(Intent::Unknown, 0.0, "Empty message".to_string());
        }

        let matched: Vec<&CompiledCategory> = self
            .categories
            .iter()
            .filter(|c| c.patterns.iter().any(|re| re.is_match(text)))
            .collect();

        let mut winner: Option<&CompiledCategory> = None;
        for &category in &matched {
            if winner.map_or(true, |w| category.confidence > w.confidence) {
                winner = Some(category);
            }
        }

        match winner {
            Some(winner) => {
                let others: Vec<&str> = matched
                    .iter()
                    .filter(|c| c.intent != winner.intent)
                    .map(|c| c.intent.as_str())
                    .collect();
                let mut reasoning = format!(
                    "Matched {} patterns (confidence {:.2})",
                    winner.intent, winner.confidence
                );
                if !others.is_empty() {
                    reasoning.push_str(&format!("; also matched {}", others.join(", ")));
                }
                Classification::new(winner.intent, winner.confidence, reasoning)
            }
            None => Classification::new(
                Intent::GeneralInquiry,
                FALLBACK_CONFIDENCE,
                "No category patterns matched".to_string(),
            ),
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_greeting() {
        let result = IntentClassifier::new().classify("hi");
        assert_eq!(result.intent, Intent::Greeting);
        assert_eq!(result.confidence, 0.70);
        assert_eq!(result.suggested_action, SuggestedAction::AutoRespond);
    }

    #[test]
    fn test_purchase_beats_pricing() {
        let result = IntentClassifier::new()
            .classify("I want to buy the bluetooth headphones, how much?");
        assert_eq!(result.intent, Intent::PurchaseIntent);
        assert_eq!(result.confidence, 0.85);
        assert_eq!(result.suggested_action, SuggestedAction::AiGenerate);
        assert!(result.reasoning.contains("pricing_inquiry"));
    }

    #[test]
    fn test_opt_out() {
        let result = IntentClassifier::new().classify("STOP");
        assert_eq!(result.intent, Intent::OptOut);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.suggested_action, SuggestedAction::AutoRespond);
    }

    #[test]
    fn test_equal_confidence_keeps_declaration_order() {
        // pricing_inquiry and support_request are both 0.80
        let result = IntentClassifier::new().classify("what does it cost? I need help");
        assert_eq!(result.intent, Intent::PricingInquiry);
    }

    #[test]
    fn test_complaint_escalates() {
        let result = IntentClassifier::new().classify("This is terrible, where is my refund");
        assert_eq!(result.intent, Intent::Complaint);
        assert_eq!(result.suggested_action, SuggestedAction::EscalateHuman);
    }

    #[test]
    fn test_whitespace_is_unknown() {
        let classifier = IntentClassifier::new();
        for text in ["", " ", "\n\t  "] {
            let result = classifier.classify(text);
            assert_eq!(result.intent, Intent::Unknown);
            assert_eq!(result.confidence, 0.0);
            assert_eq!(result.suggested_action, SuggestedAction::Ignore);
        }
    }

    #[test]
    fn test_no_match_is_general_inquiry() {
        let result = IntentClassifier::new().classify("What are your opening hours?");
        assert_eq!(result.intent, Intent::GeneralInquiry);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.suggested_action, SuggestedAction::AiGenerate);
    }

    #[test]
    fn test_classification_is_pure() {
        let classifier = IntentClassifier::new();
        let text = "hello, I have a problem with my order";
        assert_eq!(classifier.classify(text), classifier.classify(text));
    }
}

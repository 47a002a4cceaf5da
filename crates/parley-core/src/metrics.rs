//! Prometheus metrics for the messaging pipeline

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters owned by one registry; cloned handles share the same series
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Webhook ingest outcomes (`processed`, `deduped`, `failed`, `rejected`)
    pub webhook_events: IntCounterVec,
    /// Classifications per intent
    pub classifications: IntCounterVec,
    /// Auto-response sends per outcome
    pub auto_responses: IntCounterVec,
    /// Campaign recipient sends per outcome
    pub campaign_sends: IntCounterVec,
    /// Delivery status updates per status
    pub delivery_updates: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("parley".to_string()), None)?;

        let webhook_events = IntCounterVec::new(
            Opts::new("webhook_events_total", "Webhook ingest outcomes"),
            &["outcome"],
        )?;
        let classifications = IntCounterVec::new(
            Opts::new("classifications_total", "Inbound messages classified per intent"),
            &["intent"],
        )?;
        let auto_responses = IntCounterVec::new(
            Opts::new("auto_responses_total", "Auto-response sends per outcome"),
            &["outcome"],
        )?;
        let campaign_sends = IntCounterVec::new(
            Opts::new("campaign_sends_total", "Campaign recipient sends per outcome"),
            &["outcome"],
        )?;
        let delivery_updates = IntCounterVec::new(
            Opts::new("delivery_updates_total", "Delivery status callbacks applied"),
            &["status"],
        )?;

        registry.register(Box::new(webhook_events.clone()))?;
        registry.register(Box::new(classifications.clone()))?;
        registry.register(Box::new(auto_responses.clone()))?;
        registry.register(Box::new(campaign_sends.clone()))?;
        registry.register(Box::new(delivery_updates.clone()))?;

        Ok(Self {
            registry,
            webhook_events,
            classifications,
            auto_responses,
            campaign_sends,
            delivery_updates,
        })
    }

    /// Render every series in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

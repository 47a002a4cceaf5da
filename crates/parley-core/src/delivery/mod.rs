//! Delivery Module - Status callbacks and campaign delivery statistics

mod tracker;

pub use tracker::{CampaignDeliveryStats, DeliveryTracker};

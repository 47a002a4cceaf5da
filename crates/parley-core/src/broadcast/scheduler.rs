//! Scheduled campaign worker

use super::manager::CampaignManager;
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{error, info};

/// Periodically executes campaigns whose scheduled time has passed
pub struct CampaignScheduler {
    manager: Arc<CampaignManager>,
    /// Interval between checks (seconds)
    poll_interval_secs: u64,
}

impl CampaignScheduler {
    pub fn new(manager: Arc<CampaignManager>) -> Self {
        Self {
            manager,
            poll_interval_secs: 30,
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs.max(1);
        self
    }

    /// Run the worker until the task is dropped
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.poll_interval_secs,
            "Campaign scheduler started"
        );

        loop {
            ticker.tick().await;

            match self.manager.run_due_campaigns().await {
                Ok(results) if !results.is_empty() => {
                    info!(count = results.len(), "Scheduled campaigns executed");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Error running scheduled campaigns"),
            }
        }
    }
}

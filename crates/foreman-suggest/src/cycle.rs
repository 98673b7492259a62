//! Background interval service driving expiry and generation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::service::SuggestionService;

/// Periodically sweeps expired suggestions and runs one generation
/// pass per suggesting agent. Agents run sequentially; one agent's
/// failure never stops the rest of the sweep.
pub struct SuggestionCycle {
    service: Arc<SuggestionService>,
    interval: Duration,
}

impl SuggestionCycle {
    /// Creates a cycle over the service, ticking at the service's
    /// configured interval.
    pub fn new(service: Arc<SuggestionService>) -> Self {
        let interval = service.cycle_interval();
        Self { service, interval }
    }

    /// Creates a cycle with an explicit interval.
    pub fn with_interval(service: Arc<SuggestionService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Spawns the cycle loop. The first pass runs immediately, then
    /// once per interval. Abort the handle to stop.
    pub fn start(self) -> JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "Suggestion cycle started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    /// One full pass: expiry sweep, then every suggesting agent.
    pub async fn run_once(&self) {
        match self.service.expire_due().await {
            Ok(0) => {}
            Ok(swept) => debug!(count = swept, "Cycle swept expired suggestions"),
            Err(e) => warn!(error = %e, "Expiry sweep failed"),
        }

        for agent in self.service.directory().suggesting_agents().await {
            match self.service.generate_for_agent(&agent).await {
                Ok(created) if created.is_empty() => {
                    debug!(agent = %agent, "Cycle produced nothing new");
                }
                Ok(created) => {
                    debug!(agent = %agent, count = created.len(), "Cycle produced suggestions");
                }
                Err(e) => {
                    warn!(agent = %agent, error = %e, "Cycle pass failed for agent");
                }
            }
        }
    }
}

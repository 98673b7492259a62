//! Cron-driven firing of workflow definitions.
//!
//! The loop computes each cron workflow's next fire time, sleeps until
//! the nearest one, and runs every workflow due within a one-second
//! tolerance window through the runner. Run keys keep a fired step
//! idempotent per day no matter how often the schedule triggers.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use foreman_core::{ForemanError, ForemanResult};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::defs::WorkflowDef;
use crate::runner::WorkflowRunner;

/// Fires `auto` workflows whose schedule is a cron expression.
pub struct WorkflowScheduler {
    runner: Arc<WorkflowRunner>,
    workflows: Vec<WorkflowDef>,
}

impl WorkflowScheduler {
    /// Creates a scheduler over the given definitions. Startup-scheduled
    /// and non-`auto` workflows are ignored here.
    pub fn new(runner: Arc<WorkflowRunner>, workflows: Vec<WorkflowDef>) -> Self {
        Self { runner, workflows }
    }

    /// Parses a cron expression in the seconds-first 7-field format:
    /// sec min hour day-of-month month day-of-week year.
    pub fn parse_cron(expr: &str) -> ForemanResult<Schedule> {
        Schedule::from_str(expr)
            .map_err(|e| ForemanError::Validation(format!("invalid cron expression '{expr}': {e}")))
    }

    /// Next fire time for a cron expression, or an error when the
    /// expression is invalid or has no upcoming times.
    pub fn next_fire_time(expr: &str) -> ForemanResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(expr)?;
        schedule.upcoming(Utc).next().ok_or_else(|| {
            ForemanError::Validation(format!("cron expression '{expr}' never fires again"))
        })
    }

    /// Workflows this scheduler will fire.
    pub fn cron_workflows(&self) -> Vec<&WorkflowDef> {
        self.workflows
            .iter()
            .filter(|def| def.auto && !def.runs_at_startup())
            .collect()
    }

    /// Spawns the scheduler loop. Abort the handle to stop.
    pub fn start(self) -> JoinHandle<()> {
        info!(
            workflows = self.cron_workflows().len(),
            "Workflow scheduler started"
        );
        tokio::spawn(async move {
            loop {
                self.run_pass().await;
            }
        })
    }

    /// One pass: sleep until the nearest fire time, then run everything
    /// due within the tolerance window.
    async fn run_pass(&self) {
        let eligible = self.cron_workflows();
        if eligible.is_empty() {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            return;
        }

        let mut nearest: Option<DateTime<Utc>> = None;
        let mut fire_times: Vec<(&WorkflowDef, DateTime<Utc>)> = Vec::new();
        for def in eligible {
            match Self::next_fire_time(&def.schedule) {
                Ok(next) => {
                    fire_times.push((def, next));
                    nearest = Some(match nearest {
                        Some(current) if next < current => next,
                        Some(current) => current,
                        None => next,
                    });
                }
                Err(e) => {
                    warn!(workflow = %def.name, error = %e, "Skipping workflow with unusable schedule");
                }
            }
        }
        let Some(nearest) = nearest else {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            return;
        };

        let now = Utc::now();
        if nearest > now {
            let wait = (nearest - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
        }

        let fire_threshold = Utc::now() + chrono::Duration::seconds(1);
        for (def, fire_time) in &fire_times {
            if *fire_time <= fire_threshold {
                info!(workflow = %def.name, "Cron schedule fired");
                if let Err(e) = self.runner.run_workflow(def).await {
                    error!(workflow = %def.name, error = %e, "Scheduled workflow run failed");
                }
            }
        }
    }
}

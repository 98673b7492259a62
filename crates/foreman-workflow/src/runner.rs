//! The bounded workflow step runner.
//!
//! Steps are expanded into queue items and drained by a small worker
//! pool. Each step runs at most once per UTC day: the run key
//! `<workflow>:<step title>:<date>` is checked inside the retry body,
//! so a step that raced to completion on one attempt is skipped on the
//! next. Every terminal outcome lands as one [`WorkflowRun`] row; step
//! failures never escape the pool.

use std::sync::Arc;

use chrono::Utc;
use foreman_core::{ForemanResult, Task, TaskPriority, WorkflowRun};
use foreman_delegate::{DelegateOptions, DelegationMachine};
use foreman_store::{TaskStore, WorkflowRunStore};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::defs::WorkflowDef;

/// Default worker pool width.
pub const DEFAULT_POOL_SIZE: usize = 2;

/// Default retries per step; a step gets `retries + 1` attempts.
pub const DEFAULT_RETRIES: usize = 1;

/// One queued unit of work: a single step of a named workflow.
#[derive(Debug, Clone)]
struct StepItem {
    workflow: String,
    agent: String,
    title: String,
    description: String,
    priority: TaskPriority,
}

enum StepOutcome {
    /// A task with today's run key already existed.
    Skipped(Uuid),
    /// A fresh task was created and delegated.
    Delegated(Uuid),
}

/// Drains workflow steps through a bounded pool of workers, creating
/// and delegating one task per step per day.
#[derive(Clone)]
pub struct WorkflowRunner {
    tasks: Arc<dyn TaskStore>,
    runs: Arc<dyn WorkflowRunStore>,
    machine: DelegationMachine,
    pool_size: usize,
    retries: usize,
}

impl WorkflowRunner {
    /// Wires the runner to the task store, the run audit store, and the
    /// delegation machine.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        runs: Arc<dyn WorkflowRunStore>,
        machine: DelegationMachine,
    ) -> Self {
        Self {
            tasks,
            runs,
            machine,
            pool_size: DEFAULT_POOL_SIZE,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Sets the worker pool width. Clamped to at least one worker.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Sets the retry count per step.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Runs every `auto` workflow whose schedule is `startup`. Returns
    /// the number of steps queued.
    pub async fn run_startup(&self, defs: &[WorkflowDef]) -> ForemanResult<usize> {
        let eligible: Vec<&WorkflowDef> = defs
            .iter()
            .filter(|def| def.auto && def.runs_at_startup())
            .collect();
        self.run_defs(&eligible).await
    }

    /// Runs one workflow's steps through the pool. The scheduler calls
    /// this on every cron fire; run keys keep same-day firings idempotent.
    pub async fn run_workflow(&self, def: &WorkflowDef) -> ForemanResult<usize> {
        self.run_defs(&[def]).await
    }

    async fn run_defs(&self, defs: &[&WorkflowDef]) -> ForemanResult<usize> {
        let items: Vec<StepItem> = defs
            .iter()
            .flat_map(|def| {
                def.steps.iter().map(|step| StepItem {
                    workflow: def.name.clone(),
                    agent: def.agent.clone(),
                    title: step.title.clone(),
                    description: step.task_description().to_string(),
                    priority: step.task_priority(),
                })
            })
            .collect();
        if items.is_empty() {
            return Ok(0);
        }
        let total = items.len();

        let (tx, rx) = mpsc::channel(total);
        for item in items {
            let _ = tx.send(item).await;
        }
        drop(tx);

        // One receiver shared behind a lock; each item reaches exactly
        // one worker.
        let rx = Arc::new(Mutex::new(rx));
        let workers = self.pool_size.min(total);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            let runner = self.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    let Some(item) = next else { break };
                    runner.process_step(&item).await;
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Workflow worker panicked");
            }
        }
        Ok(total)
    }

    /// Runs one step to a terminal outcome and records it. A failed
    /// attempt repeats the whole body, existence check included.
    async fn process_step(&self, item: &StepItem) {
        let attempts = self.retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.attempt_step(item).await {
                Ok(StepOutcome::Skipped(task_id)) => {
                    info!(
                        workflow = %item.workflow,
                        step = %item.title,
                        task_id = %task_id,
                        "Workflow step already ran today, skipping"
                    );
                    let run =
                        WorkflowRun::started(&item.workflow, &item.title).completed(Some(task_id));
                    self.record(run).await;
                    return;
                }
                Ok(StepOutcome::Delegated(task_id)) => {
                    info!(
                        workflow = %item.workflow,
                        step = %item.title,
                        task_id = %task_id,
                        agent = %item.agent,
                        "Workflow step delegated"
                    );
                    let run =
                        WorkflowRun::started(&item.workflow, &item.title).completed(Some(task_id));
                    self.record(run).await;
                    return;
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        workflow = %item.workflow,
                        step = %item.title,
                        attempt,
                        attempts,
                        error = %last_error,
                        "Workflow step attempt failed"
                    );
                }
            }
        }
        let run = WorkflowRun::started(&item.workflow, &item.title).failed(&last_error);
        self.record(run).await;
    }

    async fn attempt_step(&self, item: &StepItem) -> ForemanResult<StepOutcome> {
        let run_key = format!(
            "{}:{}:{}",
            item.workflow,
            item.title,
            Utc::now().format("%Y-%m-%d")
        );
        if let Some(existing) = self.tasks.find_by_run_key(&run_key).await? {
            return Ok(StepOutcome::Skipped(existing.id));
        }

        let mut task = Task::new(&item.title, &item.description, item.priority)
            .with_run_key(run_key);
        task.insert_metadata("workflow", serde_json::json!(item.workflow));
        task.insert_metadata("workflow_step", serde_json::json!(item.title));
        self.tasks.create(&task).await?;

        let options = DelegateOptions {
            agent_name: Some(item.agent.clone()),
            ..DelegateOptions::default()
        };
        self.machine.delegate(task.id, options).await?;
        Ok(StepOutcome::Delegated(task.id))
    }

    /// Audit writes are best effort; a failed write must not take the
    /// worker down.
    async fn record(&self, run: WorkflowRun) {
        if let Err(e) = self.runs.record(&run).await {
            error!(
                workflow = %run.workflow_name,
                step = %run.step_title,
                error = %e,
                "Failed to record workflow run"
            );
        }
    }
}

//! Declarative workflow definitions loaded from `workflows.toml`.
//!
//! A workflow names an agent and an ordered list of steps; the runner
//! turns each step into at most one task per day. Definitions are
//! validated in full before any task is created.

use std::path::Path;
use std::str::FromStr;

use cron::Schedule;
use foreman_core::{ForemanError, ForemanResult, TaskPriority};
use serde::{Deserialize, Serialize};

/// Schedule value for workflows that run once when the process starts.
pub const STARTUP_SCHEDULE: &str = "startup";

/// One step of a workflow. Expands into a task delegated to the
/// workflow's agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    /// Step title; becomes the task title and part of the run key.
    pub title: String,
    /// Task description; defaults to the title when absent.
    #[serde(default)]
    pub description: Option<String>,
    /// Task priority; `medium` when absent.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

impl StepDef {
    /// Priority the expanded task gets.
    pub fn task_priority(&self) -> TaskPriority {
        self.priority.unwrap_or_default()
    }

    /// Description the expanded task gets.
    pub fn task_description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.title)
    }
}

/// A named workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    /// Unique workflow name; part of every step's run key.
    pub name: String,
    /// Agent every step is delegated to.
    pub agent: String,
    /// Whether the runner may execute this workflow without a human.
    #[serde(default)]
    pub auto: bool,
    /// `"startup"` or a cron expression (seconds-first, 7 fields).
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

fn default_schedule() -> String {
    STARTUP_SCHEDULE.to_string()
}

impl WorkflowDef {
    /// Whether this workflow runs at process start rather than on cron.
    pub fn runs_at_startup(&self) -> bool {
        self.schedule == STARTUP_SCHEDULE
    }

    /// Checks structural rules: non-empty name, agent, and steps, a
    /// title on every step, and a parseable schedule.
    pub fn validate(&self) -> ForemanResult<()> {
        if self.name.trim().is_empty() {
            return Err(ForemanError::Validation(
                "workflow name must not be empty".to_string(),
            ));
        }
        if self.agent.trim().is_empty() {
            return Err(ForemanError::Validation(format!(
                "workflow '{}' has no agent",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(ForemanError::Validation(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.title.trim().is_empty() {
                return Err(ForemanError::Validation(format!(
                    "workflow '{}' step {} has an empty title",
                    self.name,
                    index + 1
                )));
            }
        }
        if !self.runs_at_startup() {
            Schedule::from_str(&self.schedule).map_err(|e| {
                ForemanError::Validation(format!(
                    "workflow '{}' has an invalid schedule '{}': {e}",
                    self.name, self.schedule
                ))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowFile {
    #[serde(default)]
    workflows: Vec<WorkflowDef>,
}

/// Parses and validates a workflow file from TOML text.
pub fn load_str(raw: &str) -> ForemanResult<Vec<WorkflowDef>> {
    let file: WorkflowFile = toml::from_str(raw)
        .map_err(|e| ForemanError::Validation(format!("workflow file: {e}")))?;
    for def in &file.workflows {
        def.validate()?;
    }
    Ok(file.workflows)
}

/// Reads, parses, and validates a workflow file from disk.
pub fn load_path(path: impl AsRef<Path>) -> ForemanResult<Vec<WorkflowDef>> {
    let raw = std::fs::read_to_string(path)?;
    load_str(&raw)
}

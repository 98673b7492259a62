//! Declarative workflows: definitions, the bounded runner, and the
//! cron scheduler.
//!
//! A `workflows.toml` file names workflows and their steps. The runner
//! expands eligible workflows into queue items drained by a small
//! worker pool; a per-day run key makes every step idempotent no matter
//! how often the runner executes. Startup workflows fire once when the
//! process boots, cron workflows fire from a background scheduler loop,
//! and every terminal step outcome is recorded as a `WorkflowRun` row.
//!
//! # Main types
//!
//! - [`WorkflowDef`] / [`StepDef`]: validated definitions from TOML
//! - [`WorkflowRunner`]: the bounded worker pool
//! - [`WorkflowScheduler`]: cron-driven firing

/// TOML definitions and validation.
pub mod defs;
/// The bounded step runner.
pub mod runner;
/// Cron-driven firing.
pub mod scheduler;

pub use defs::{load_path, load_str, StepDef, WorkflowDef, STARTUP_SCHEDULE};
pub use runner::{WorkflowRunner, DEFAULT_POOL_SIZE, DEFAULT_RETRIES};
pub use scheduler::WorkflowScheduler;

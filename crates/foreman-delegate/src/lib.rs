//! Task classification and the delegation state machine.
//!
//! A task submitted to Foreman is matched to an agent in three phases
//! (keyword scoring, constrained model call, generalist fallback), then
//! executed asynchronously while the caller holds an acknowledgement.
//! Low-confidence and urgent outcomes park in review until an operator
//! approves or rejects them.
//!
//! # Main types
//!
//! - [`Classifier`]: resolves a task to an agent name and a confidence
//! - [`Classification`]: the routing decision and how it was reached
//! - [`DelegationMachine`]: owns the delegation lifecycle end to end
//! - [`DelegateOptions`]: per-request overrides for a delegation
//! - [`DelegationOutcome`]: terminal summary of one chain or parallel step

/// Three-phase task-to-agent classification.
pub mod classifier;
/// Delegation lifecycle: ack, async execution, review gates, composition.
pub mod machine;
/// Deterministic prompt assembly for classification and execution.
pub mod prompts;

pub use classifier::{Classification, Classifier};
pub use machine::{DelegateOptions, DelegationAck, DelegationMachine, DelegationOutcome};

//! Core types and error definitions for Foreman.
//!
//! This crate provides the foundational types shared across all Foreman
//! crates: the task and delegation entities, suggestion records, workflow
//! audit rows, agent profiles, and the unified error enum.
//!
//! # Main types
//!
//! - [`ForemanError`]: unified error enum for all Foreman subsystems.
//! - [`ForemanResult`]: convenience alias for `Result<T, ForemanError>`.
//! - [`Task`]: a unit of work routed to an agent.
//! - [`Delegation`]: one execution attempt of a task by an agent.
//! - [`Suggestion`]: proactive agent output awaiting human triage.
//! - [`WorkflowRun`]: audit record for one workflow step attempt.
//! - [`AgentProfile`]: capability and prompt description of an agent.

/// Error enum and result alias.
pub mod error;
/// Task, delegation, suggestion, workflow, and agent entities.
pub mod types;

pub use error::{ForemanError, ForemanResult};
pub use types::{
    AgentProfile, ConversationTurn, Delegation, DelegationStatus, Suggestion, SuggestionSource,
    SuggestionStatus, Task, TaskPriority, TaskSnapshot, TaskStatus, TurnRole, WorkflowRun,
    WorkflowRunStatus,
};

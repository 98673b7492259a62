//! Proactive suggestion pipeline.
//!
//! Agents surface work they think should happen. Suggestions arrive two
//! ways: the periodic generation cycle asks each suggesting agent for
//! ideas (with prerequisite gating so unconfigured agents ask for setup
//! instead), and outside callers push them in through ingestion, which
//! is idempotent by content fingerprint, rate-limited per agent, and
//! debounced. Listings cluster near-duplicates and rank them by
//! confidence, agent trust, and recency. A human accepts a suggestion
//! into a real task, rejects it, or talks it over with the agent.
//!
//! # Main types
//!
//! - [`SuggestionService`]: ingestion, generation, triage, expiry
//! - [`SuggestSettings`] / [`Credentials`]: pipeline tuning and setup flags
//! - [`IngestRequest`]: payload pushed in from outside
//! - [`SuggestionCluster`]: scored near-duplicate group
//! - [`SuggestionCycle`]: background interval service

/// Near-duplicate clustering and scoring.
pub mod cluster;
/// Background interval service.
pub mod cycle;
/// Per-agent generation with prerequisite gating.
mod generate;
/// Sliding-window rate limiting.
pub mod limiter;
/// The service owning ingestion, triage, and expiry.
pub mod service;

pub use cluster::{ScoredSuggestion, SuggestionCluster};
pub use cycle::SuggestionCycle;
pub use limiter::RateLimiter;
pub use service::{Credentials, IngestRequest, SuggestSettings, SuggestionService};

//! Agent profiles and the runtime agent directory.
//!
//! The directory is the single source of truth for which agents exist, what
//! they are good at, and how they prompt. It is seeded from the built-in
//! catalog, overlaid with persisted profiles, and grows at runtime through
//! explicit or automatic registration.
//!
//! # Main types
//!
//! - [`AgentDirectory`]: thread-safe registry backed by an
//!   [`AgentStore`](foreman_store::AgentStore).
//! - [`catalog::builtin_profiles`]: the default agent catalog.

/// Built-in agent catalog and prompt templates.
pub mod catalog;
/// Runtime agent registry.
pub mod directory;

pub use catalog::{builtin_profiles, GENERAL_AGENT};
pub use directory::AgentDirectory;

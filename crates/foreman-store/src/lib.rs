//! Persistence for Foreman entities.
//!
//! Five narrow store traits, one in-memory backend for tests and ephemeral
//! runs, and one SQLite backend for durable runs. The SQLite backend keeps
//! the queryable columns relational and the full entity as a JSON body.

/// In-memory backend.
pub mod memory;
/// SQLite backend.
pub mod sqlite;
/// Store traits.
pub mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AgentStore, DelegationStore, SuggestionStore, TaskStore, WorkflowRunStore};

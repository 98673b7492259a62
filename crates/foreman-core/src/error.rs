//! Unified error handling for the Foreman workspace.

/// Top-level error type for Foreman.
///
/// Each variant corresponds to a failure class that crosses crate
/// boundaries. Classification timeouts are deliberately absent: a timed-out
/// classifier call falls through to the next phase and is never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum ForemanError {
    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `"task"` or `"delegation"`.
        kind: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },

    /// A request or definition failed validation before any state changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A text-generation gateway failure: network error, non-success
    /// status, or a response shape the caller could not use.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A caller exceeded the ingestion rate limit.
    #[error("Rate limited: {scope}")]
    RateLimited {
        /// The limited scope, e.g. the agent name.
        scope: String,
    },

    /// An error from the persistence layer.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForemanError {
    /// Builds a [`ForemanError::NotFound`] for the given entity kind and id.
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// A convenience `Result` alias using [`ForemanError`].
pub type ForemanResult<T> = Result<T, ForemanError>;

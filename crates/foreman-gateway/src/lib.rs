//! The HTTP surface over the delegation machine, the suggestion
//! pipeline, the task store, and the workflow audit trail.
//!
//! Handlers stay thin: they parse the request, call one service or
//! machine method, and map the result. Execution failures never
//! surface here; they land on the task and delegation rows.
//!
//! # Main types
//!
//! - [`AppState`]: the wired services every handler reads
//! - [`GatewayServer`]: builds the router, with or without auth
//! - [`AuthConfig`]: optional API-key gate
//! - [`ApiError`]: `ForemanError` → status code + JSON body

/// Delegation, review, and composition routes.
pub mod delegation;
/// `ForemanError` to HTTP response mapping.
pub mod error;
/// API-key auth and request tracing.
pub mod middleware;
/// Router assembly and shared state.
pub mod server;
/// Suggestion ingestion and triage routes.
pub mod suggestions;
/// Task facade and workflow audit routes.
pub mod tasks;

pub use error::ApiError;
pub use middleware::AuthConfig;
pub use server::{AppState, GatewayServer};

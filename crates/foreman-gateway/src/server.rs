//! Router assembly and shared state for the HTTP surface.

use std::sync::Arc;

use axum::middleware as axum_mw;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use foreman_agent::AgentDirectory;
use foreman_delegate::DelegationMachine;
use foreman_store::{DelegationStore, TaskStore, WorkflowRunStore};
use foreman_suggest::SuggestionService;
use tower::ServiceBuilder;

use crate::middleware::{auth_middleware, trace_requests, AuthConfig};
use crate::{delegation, suggestions, tasks};

/// Shared application state.
pub struct AppState {
    /// Delegation lifecycle owner.
    pub machine: DelegationMachine,
    /// Suggestion pipeline.
    pub suggestions: Arc<SuggestionService>,
    /// Registered agents and their trust weights.
    pub directory: AgentDirectory,
    /// Task rows.
    pub tasks: Arc<dyn TaskStore>,
    /// Delegation rows.
    pub delegations: Arc<dyn DelegationStore>,
    /// Workflow audit rows.
    pub runs: Arc<dyn WorkflowRunStore>,
}

/// The main HTTP server.
pub struct GatewayServer;

impl GatewayServer {
    /// Builds the router without auth.
    pub fn build(state: Arc<AppState>) -> Router {
        Self::build_with_auth(state, AuthConfig::new(vec![]))
    }

    /// Builds the router with API-key auth when keys are configured.
    /// Request tracing wraps everything, auth included, so refusals are
    /// logged too.
    pub fn build_with_auth(state: Arc<AppState>, auth: AuthConfig) -> Router {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/delegate/{task_id}", post(delegation::delegate))
            .route("/delegate/{task_id}/classify", post(delegation::classify))
            .route("/delegate/{task_id}/delegations", get(delegation::history))
            .route("/delegate/{task_id}/chain", post(delegation::chain))
            .route("/delegate/{task_id}/parallel", post(delegation::parallel))
            .route("/delegations/{id}/approve", post(delegation::approve))
            .route("/delegations/{id}/reject", post(delegation::reject))
            .route("/suggestions/ingest", post(suggestions::ingest))
            .route("/suggestions", get(suggestions::list))
            .route("/suggestions/summary", get(suggestions::summary))
            .route("/suggestions/{id}/approve", post(suggestions::approve))
            .route("/suggestions/{id}/reject", post(suggestions::reject))
            .route("/suggestions/{id}/reply", post(suggestions::reply))
            .route("/workflows/runs", get(tasks::workflow_runs))
            .route("/tasks", post(tasks::create).get(tasks::list))
            .route("/tasks/{id}", get(tasks::get))
            .route("/tasks/{id}/cancel", post(tasks::cancel))
            .with_state(state);

        if auth.is_enabled() {
            app.layer(
                ServiceBuilder::new()
                    .layer(axum_mw::from_fn(trace_requests))
                    .layer(axum_mw::from_fn_with_state(auth, auth_middleware)),
            )
        } else {
            app.layer(ServiceBuilder::new().layer(axum_mw::from_fn(trace_requests)))
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    serde_json::json!({"status": "ok", "service": "foreman"}).to_string()
}

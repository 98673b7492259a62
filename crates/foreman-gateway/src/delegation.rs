//! Delegation routes: hand-off, classification preview, review gates,
//! and multi-agent composition.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use foreman_core::{Delegation, ForemanError};
use foreman_delegate::{Classification, DelegateOptions, DelegationAck, DelegationOutcome};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

/// Wait bound applied to parallel delegations when the request does not
/// name one.
const DEFAULT_PARALLEL_WAIT: Duration = Duration::from_secs(300);

/// Body for `POST /delegate/{task_id}/chain`.
#[derive(Debug, serde::Deserialize)]
pub struct ChainRequest {
    /// Agents to run, in order.
    pub agents: Vec<String>,
    /// Keep going past a failed step instead of stopping the chain.
    #[serde(default)]
    pub continue_on_error: bool,
}

/// Body for `POST /delegate/{task_id}/parallel`.
#[derive(Debug, serde::Deserialize)]
pub struct ParallelRequest {
    /// Agents to run concurrently.
    pub agents: Vec<String>,
    /// Seconds to wait before giving up on stragglers.
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

/// Body for `POST /delegations/{id}/reject`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct RejectRequest {
    /// Free-form reason recorded on the delegation.
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /delegate/{task_id}`. Classifies (unless an agent is forced),
/// records the delegation, and kicks off execution in the background.
/// Answers 202 immediately with the acknowledgement.
pub async fn delegate(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    body: Option<Json<DelegateOptions>>,
) -> Result<(StatusCode, Json<DelegationAck>), ApiError> {
    let options = body.map(|Json(options)| options).unwrap_or_default();
    let ack = state.machine.delegate(task_id, options).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

/// `POST /delegate/{task_id}/classify`. Dry run: answers the routing
/// decision without recording anything.
pub async fn classify(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Classification>, ApiError> {
    let classification = state.machine.classify_task(task_id).await?;
    Ok(Json(classification))
}

/// `GET /delegate/{task_id}/delegations`. Full delegation history for
/// one task, newest first.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<Delegation>>, ApiError> {
    state
        .tasks
        .get(task_id)
        .await?
        .ok_or_else(|| ForemanError::not_found("task", task_id))?;
    let history = state.delegations.list_for_task(task_id).await?;
    Ok(Json(history))
}

/// `POST /delegations/{id}/approve`. Releases a delegation parked in
/// review.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delegation>, ApiError> {
    let delegation = state.machine.approve(id).await?;
    Ok(Json(delegation))
}

/// `POST /delegations/{id}/reject`. Fails a non-terminal delegation and
/// frees its task for another round.
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<Delegation>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let delegation = state.machine.reject(id, request.reason).await?;
    Ok(Json(delegation))
}

/// `POST /delegate/{task_id}/chain`. Runs the named agents in order and
/// answers once the chain settles.
pub async fn chain(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<ChainRequest>,
) -> Result<Json<Vec<DelegationOutcome>>, ApiError> {
    let outcomes = state
        .machine
        .delegate_chain(task_id, &request.agents, request.continue_on_error)
        .await?;
    Ok(Json(outcomes))
}

/// `POST /delegate/{task_id}/parallel`. Runs the named agents
/// concurrently and answers with every outcome.
pub async fn parallel(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<ParallelRequest>,
) -> Result<Json<Vec<DelegationOutcome>>, ApiError> {
    let max_wait = request
        .max_wait_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_PARALLEL_WAIT);
    let outcomes = state
        .machine
        .delegate_parallel(task_id, &request.agents, max_wait)
        .await?;
    Ok(Json(outcomes))
}

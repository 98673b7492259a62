//! Suggestion routes: push ingestion, listing, clustering, and triage.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use foreman_core::{Suggestion, SuggestionStatus, Task};
use foreman_suggest::{IngestRequest, SuggestionCluster};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

/// Filters for `GET /suggestions`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ListQuery {
    /// Only suggestions attributed to this agent.
    pub agent: Option<String>,
    /// Only suggestions in this status.
    pub status: Option<String>,
}

/// Filters for `GET /suggestions/summary`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct SummaryQuery {
    /// Cluster this status instead of pending.
    pub status: Option<String>,
    /// Drop clusters scoring below this floor.
    pub min_score: Option<f64>,
}

/// Body for `POST /suggestions/{id}/reject`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct RejectRequest {
    /// Reason appended to the suggestion's conversation.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body for `POST /suggestions/{id}/reply`.
#[derive(Debug, serde::Deserialize)]
pub struct ReplyRequest {
    /// The human's message to the suggesting agent.
    pub text: String,
}

/// Answer for `POST /suggestions/{id}/approve`.
#[derive(Debug, serde::Serialize)]
pub struct AcceptResponse {
    /// The suggestion, now accepted.
    pub suggestion: Suggestion,
    /// The task it turned into.
    pub task: Task,
}

fn parse_status(raw: Option<&str>) -> Result<Option<SuggestionStatus>, ApiError> {
    raw.map(str::parse).transpose().map_err(ApiError::from)
}

/// `POST /suggestions/ingest`. Answers 201 for a fresh suggestion and
/// 200 when the fingerprint matched an open one. Rate-limit refusals
/// surface as 429.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<Suggestion>), ApiError> {
    let (suggestion, created) = state.suggestions.ingest(request).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(suggestion)))
}

/// `GET /suggestions`. Visible suggestions, newest first, with optional
/// agent and status filters.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Suggestion>>, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let rows = state
        .suggestions
        .list(query.agent.as_deref(), status)
        .await?;
    Ok(Json(rows))
}

/// `GET /suggestions/summary`. Clustered, ranked view of the queue.
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<SuggestionCluster>>, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let clusters = state
        .suggestions
        .summarize(status, query.min_score.unwrap_or(0.0))
        .await?;
    Ok(Json(clusters))
}

/// `POST /suggestions/{id}/approve`. Converts a pending suggestion into
/// a task and hands the task to the suggesting agent.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptResponse>, ApiError> {
    let (suggestion, task) = state.suggestions.accept(id).await?;
    Ok(Json(AcceptResponse { suggestion, task }))
}

/// `POST /suggestions/{id}/reject`. Dismisses a pending suggestion.
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<Suggestion>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let suggestion = state.suggestions.reject(id, request.reason).await?;
    Ok(Json(suggestion))
}

/// `POST /suggestions/{id}/reply`. Appends the human's message to the
/// suggestion's conversation and asks the agent to answer it.
pub async fn reply(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<Suggestion>, ApiError> {
    let suggestion = state.suggestions.reply(id, &request.text).await?;
    Ok(Json(suggestion))
}

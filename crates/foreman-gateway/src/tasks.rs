//! Task facade routes and the workflow audit listing.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use foreman_core::{ForemanError, Task, TaskPriority, WorkflowRun};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

/// Body for `POST /tasks`.
#[derive(Debug, serde::Deserialize)]
pub struct CreateTaskRequest {
    /// Short imperative summary.
    pub title: String,
    /// Longer free-form context.
    #[serde(default)]
    pub description: String,
    /// Defaults to medium.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

/// `POST /tasks`. Records a task without delegating it.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    if request.title.trim().is_empty() {
        return Err(ForemanError::Validation("task title is empty".into()).into());
    }
    let task = Task::new(
        request.title.trim(),
        &request.description,
        request.priority.unwrap_or_default(),
    );
    state.tasks.create(&task).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /tasks`. Every task, newest first.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list().await?))
}

/// `GET /tasks/{id}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .tasks
        .get(id)
        .await?
        .ok_or_else(|| ForemanError::not_found("task", id))?;
    Ok(Json(task))
}

/// `POST /tasks/{id}/cancel`. Cancels a task that has not finished.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let task = state.machine.cancel(id).await?;
    Ok(Json(task))
}

/// `GET /workflows/runs`. The workflow audit trail, newest first.
pub async fn workflow_runs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WorkflowRun>>, ApiError> {
    Ok(Json(state.runs.list().await?))
}

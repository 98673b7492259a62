use async_trait::async_trait;
use foreman_core::{AgentProfile, Delegation, ForemanResult, Suggestion, Task, WorkflowRun};
use uuid::Uuid;

/// Task persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new task. Fails if the id or run key already exists.
    async fn create(&self, task: &Task) -> ForemanResult<()>;
    /// Fetches a task by id.
    async fn get(&self, id: Uuid) -> ForemanResult<Option<Task>>;
    /// Rewrites an existing task.
    async fn update(&self, task: &Task) -> ForemanResult<()>;
    /// Lists all tasks, newest first.
    async fn list(&self) -> ForemanResult<Vec<Task>>;
    /// Fetches the task carrying the given idempotency run key.
    async fn find_by_run_key(&self, run_key: &str) -> ForemanResult<Option<Task>>;
}

/// Delegation persistence.
#[async_trait]
pub trait DelegationStore: Send + Sync {
    /// Inserts a new delegation.
    async fn create(&self, delegation: &Delegation) -> ForemanResult<()>;
    /// Fetches a delegation by id.
    async fn get(&self, id: Uuid) -> ForemanResult<Option<Delegation>>;
    /// Rewrites an existing delegation.
    async fn update(&self, delegation: &Delegation) -> ForemanResult<()>;
    /// Lists a task's delegations, newest first.
    async fn list_for_task(&self, task_id: Uuid) -> ForemanResult<Vec<Delegation>>;
    /// Lists the most recent delegations across all tasks, newest first.
    async fn list_recent(&self, limit: usize) -> ForemanResult<Vec<Delegation>>;
}

/// Suggestion persistence.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Inserts a new suggestion.
    async fn create(&self, suggestion: &Suggestion) -> ForemanResult<()>;
    /// Fetches a suggestion by id.
    async fn get(&self, id: Uuid) -> ForemanResult<Option<Suggestion>>;
    /// Rewrites an existing suggestion.
    async fn update(&self, suggestion: &Suggestion) -> ForemanResult<()>;
    /// Lists all suggestions, newest first.
    async fn list(&self) -> ForemanResult<Vec<Suggestion>>;
    /// Lists pending suggestions, newest first.
    async fn list_pending(&self) -> ForemanResult<Vec<Suggestion>>;
    /// Fetches the newest suggestion carrying the given fingerprint.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> ForemanResult<Option<Suggestion>>;
}

/// Workflow run audit persistence. Append-only.
#[async_trait]
pub trait WorkflowRunStore: Send + Sync {
    /// Appends one run record.
    async fn record(&self, run: &WorkflowRun) -> ForemanResult<()>;
    /// Lists all run records, newest first.
    async fn list(&self) -> ForemanResult<Vec<WorkflowRun>>;
}

/// Agent profile persistence.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Inserts or replaces a profile by name.
    async fn upsert(&self, profile: &AgentProfile) -> ForemanResult<()>;
    /// Fetches a profile by name.
    async fn get(&self, name: &str) -> ForemanResult<Option<AgentProfile>>;
    /// Lists all profiles, sorted by name.
    async fn list(&self) -> ForemanResult<Vec<AgentProfile>>;
}

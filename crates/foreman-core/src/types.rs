//! Entities shared across the Foreman crates.

use crate::error::ForemanError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Task types ---

/// Priority of a [`Task`], also carried by suggestions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Normal work.
    #[default]
    Medium,
    /// Should be picked up soon.
    High,
    /// Always routed through human review after execution.
    Urgent,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = ForemanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            other => Err(ForemanError::Validation(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet routed.
    Pending,
    /// A delegation has been acknowledged for this task.
    Delegated,
    /// An agent is currently executing the task.
    InProgress,
    /// Execution finished but a human must sign off on the result.
    Review,
    /// Execution finished and the result was accepted.
    Completed,
    /// Execution failed; details live in the task metadata.
    Failed,
    /// Cancelled by a human before or during execution.
    Cancelled,
    /// Hidden from normal listings.
    Archived,
}

impl TaskStatus {
    /// Whether no further automatic transitions apply.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Archived
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Delegated => write!(f, "delegated"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Review => write!(f, "review"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
            TaskStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A unit of work routed to an agent.
///
/// Status and agent assignment are mutated only by the delegation machine;
/// cancellation is the one human-driven transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    /// Short human-readable summary.
    pub title: String,
    /// Free-form body used by the classifier and prompts.
    pub description: String,
    /// Scheduling and review-gate priority.
    pub priority: TaskPriority,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Name of the agent the task is routed to, once delegated.
    pub assigned_agent: Option<String>,
    /// Idempotency key for workflow-created tasks; unique when present.
    #[serde(default)]
    pub run_key: Option<String>,
    /// Delegation summaries, error digests, provenance, and similar.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task with the given title, description, and priority.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: TaskPriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            priority,
            status: TaskStatus::Pending,
            assigned_agent: None,
            run_key: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches an idempotency run key.
    pub fn with_run_key(mut self, key: impl Into<String>) -> Self {
        self.run_key = Some(key.into());
        self
    }

    /// Sets the status and refreshes `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Inserts a metadata entry and refreshes `updated_at`.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
        self.updated_at = Utc::now();
    }
}

// --- Delegation types ---

/// Lifecycle status of a [`Delegation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    /// Acknowledged, executor not yet started.
    Queued,
    /// The gateway call is in flight.
    Running,
    /// Finished and accepted. Terminal.
    Completed,
    /// Finished with an error or rejected by a human. Terminal.
    Failed,
    /// Finished but held for human sign-off.
    Review,
}

impl DelegationStatus {
    /// Whether the record must never be mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DelegationStatus::Completed | DelegationStatus::Failed)
    }
}

impl std::fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelegationStatus::Queued => write!(f, "queued"),
            DelegationStatus::Running => write!(f, "running"),
            DelegationStatus::Completed => write!(f, "completed"),
            DelegationStatus::Failed => write!(f, "failed"),
            DelegationStatus::Review => write!(f, "review"),
        }
    }
}

/// Immutable snapshot of the task fields a delegation executed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task title at delegation time.
    pub title: String,
    /// Task description at delegation time.
    pub description: String,
    /// Task priority at delegation time.
    pub priority: TaskPriority,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
        }
    }
}

/// One execution attempt of a task by one agent.
///
/// A task accumulates delegations over its life; the newest one is the
/// active attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    /// Unique identifier.
    pub id: Uuid,
    /// The task this attempt belongs to.
    pub task_id: Uuid,
    /// Resolved agent name.
    pub agent_name: String,
    /// Current lifecycle status.
    pub status: DelegationStatus,
    /// Classifier rationale, e.g. `keyword-match(4)` or `manual-assignment`.
    pub intent: String,
    /// Routing confidence in `[0, 1]`.
    pub confidence: f64,
    /// Task fields frozen at delegation time.
    pub input: TaskSnapshot,
    /// Raw gateway output on success.
    pub result: Option<String>,
    /// Raw error text on failure.
    pub error: Option<String>,
    /// When the executor picked the delegation up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the delegation reached review or a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Delegation {
    /// Creates a queued delegation for the given task and agent.
    pub fn new(
        task_id: Uuid,
        agent_name: impl Into<String>,
        intent: impl Into<String>,
        confidence: f64,
        input: TaskSnapshot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent_name: agent_name.into(),
            status: DelegationStatus::Queued,
            intent: intent.into(),
            confidence,
            input,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

// --- Suggestion types ---

/// Triage status of a [`Suggestion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    /// Awaiting human triage.
    Pending,
    /// Converted into a task.
    Accepted,
    /// Dismissed by a human.
    Rejected,
    /// Aged out before triage.
    Expired,
    /// Kept aside without conversion.
    Saved,
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestionStatus::Pending => write!(f, "pending"),
            SuggestionStatus::Accepted => write!(f, "accepted"),
            SuggestionStatus::Rejected => write!(f, "rejected"),
            SuggestionStatus::Expired => write!(f, "expired"),
            SuggestionStatus::Saved => write!(f, "saved"),
        }
    }
}

impl std::str::FromStr for SuggestionStatus {
    type Err = ForemanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SuggestionStatus::Pending),
            "accepted" => Ok(SuggestionStatus::Accepted),
            "rejected" => Ok(SuggestionStatus::Rejected),
            "expired" => Ok(SuggestionStatus::Expired),
            "saved" => Ok(SuggestionStatus::Saved),
            other => Err(ForemanError::Validation(format!(
                "unknown suggestion status: {other}"
            ))),
        }
    }
}

/// How a suggestion entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionSource {
    /// Produced by the periodic generation cycle.
    Generated,
    /// Synthesized because an agent's prerequisites are unmet.
    PrerequisiteCheck,
    /// Pushed in from outside through the ingest endpoint.
    Ingested,
}

impl std::fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestionSource::Generated => write!(f, "generated"),
            SuggestionSource::PrerequisiteCheck => write!(f, "prerequisite-check"),
            SuggestionSource::Ingested => write!(f, "ingested"),
        }
    }
}

/// Author of a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The human triaging the suggestion.
    User,
    /// The suggesting agent, role-played by the gateway.
    Agent,
}

/// One turn in the clarification thread attached to a suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who authored the turn.
    pub role: TurnRole,
    /// Turn text.
    pub text: String,
    /// UTC timestamp of the turn.
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Creates a turn authored by the human.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a turn authored by the agent.
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Agent,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Proactive agent output awaiting human triage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    /// Unique identifier.
    pub id: Uuid,
    /// The agent this suggestion is attributed to.
    pub agent_name: String,
    /// Short human-readable summary.
    pub title: String,
    /// Free-form body.
    pub description: String,
    /// Why the agent thinks this matters, when it said so.
    pub rationale: Option<String>,
    /// Priority the accepted task would carry.
    pub priority: TaskPriority,
    /// Loose grouping label, e.g. `"setup"`.
    pub category: Option<String>,
    /// Current triage status.
    pub status: SuggestionStatus,
    /// Agent-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Hex SHA-256 over title, description, and agent name.
    pub fingerprint: String,
    /// How the suggestion entered the system.
    pub data_source: SuggestionSource,
    /// Free-form labels used by clustering.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Clarification thread, oldest first.
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
    /// The task created on acceptance.
    pub accepted_task_id: Option<Uuid>,
    /// Debounce horizon; hidden from listings until this time.
    pub available_at: DateTime<Utc>,
    /// Pending rows past this time are swept to expired.
    pub expires_at: Option<DateTime<Utc>>,
    /// Rejection reasons and similar bookkeeping.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    /// Creates a pending, immediately visible suggestion.
    pub fn new(
        agent_name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            title: title.into(),
            description: description.into(),
            rationale: None,
            priority: TaskPriority::Medium,
            category: None,
            status: SuggestionStatus::Pending,
            confidence: 0.5,
            fingerprint: String::new(),
            data_source: SuggestionSource::Generated,
            tags: Vec::new(),
            conversation: Vec::new(),
            accepted_task_id: None,
            available_at: now,
            expires_at: None,
            metadata: HashMap::new(),
            created_at: now,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the data source.
    pub fn with_source(mut self, source: SuggestionSource) -> Self {
        self.data_source = source;
        self
    }

    /// Sets the rationale.
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Sets the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the clustering tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Sets the debounce horizon.
    pub fn with_available_at(mut self, at: DateTime<Utc>) -> Self {
        self.available_at = at;
        self
    }

    /// Sets the expiry deadline.
    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether the debounce horizon has passed.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.available_at <= now
    }

    /// Whether the expiry deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// --- Workflow types ---

/// Outcome of one workflow step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    /// Attempt in flight.
    Pending,
    /// Step produced or reused a task.
    Completed,
    /// Step failed after exhausting retries.
    Failed,
}

impl std::fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowRunStatus::Pending => write!(f, "pending"),
            WorkflowRunStatus::Completed => write!(f, "completed"),
            WorkflowRunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record for one workflow step attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique identifier.
    pub id: Uuid,
    /// Workflow the step belongs to.
    pub workflow_name: String,
    /// Step title.
    pub step_title: String,
    /// Outcome of this attempt.
    pub status: WorkflowRunStatus,
    /// Error text when the attempt failed.
    pub error: Option<String>,
    /// The task this step created or reused.
    pub task_id: Option<Uuid>,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Creates a pending run record for a step attempt.
    pub fn started(workflow_name: impl Into<String>, step_title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            step_title: step_title.into(),
            status: WorkflowRunStatus::Pending,
            error: None,
            task_id: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Marks the run completed, optionally linking the task it touched.
    pub fn completed(mut self, task_id: Option<Uuid>) -> Self {
        self.status = WorkflowRunStatus::Completed;
        self.task_id = task_id;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Marks the run failed with the given error text.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = WorkflowRunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self
    }
}

// --- Agent types ---

fn default_trust_weight() -> f64 {
    1.0
}

fn default_suggesting() -> bool {
    true
}

/// Capability and prompt description of an agent known to the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent name, e.g. `"coding-agent"`.
    pub name: String,
    /// One-line capability summary shown to the classifier.
    pub description: String,
    /// Capability keywords; multi-word entries score double.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Prompt template used when the agent executes a task.
    pub role_prompt: String,
    /// Prompt template used when the agent generates suggestions.
    pub suggestion_prompt: String,
    /// Scoring weight applied to this agent's suggestions.
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,
    /// Whether the suggestion cycle includes this agent.
    #[serde(default = "default_suggesting")]
    pub suggesting: bool,
    /// Whether the profile was created by auto-registration.
    #[serde(default)]
    pub auto_registered: bool,
}

impl AgentProfile {
    /// Creates a profile with empty prompts and default weights.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            keywords: Vec::new(),
            role_prompt: String::new(),
            suggestion_prompt: String::new(),
            trust_weight: 1.0,
            suggesting: true,
            auto_registered: false,
        }
    }

    /// Sets the capability keywords.
    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// Sets the task execution prompt template.
    pub fn with_role_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.role_prompt = prompt.into();
        self
    }

    /// Sets the suggestion generation prompt template.
    pub fn with_suggestion_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.suggestion_prompt = prompt.into();
        self
    }

    /// Sets the suggestion trust weight.
    pub fn with_trust_weight(mut self, weight: f64) -> Self {
        self.trust_weight = weight;
        self
    }

    /// Sets whether the suggestion cycle includes this agent.
    pub fn with_suggesting(mut self, suggesting: bool) -> Self {
        self.suggesting = suggesting;
        self
    }

    /// Marks the profile as auto-registered.
    pub fn auto_registered(mut self) -> Self {
        self.auto_registered = true;
        self
    }
}

//! The delegation state machine.
//!
//! `delegate` resolves an agent, writes a queued [`Delegation`], moves
//! the task to `delegated`, spawns the executor, and returns an
//! acknowledgement without waiting for the model. The executor records
//! every outcome on the delegation and mirrors it onto the task; its
//! own errors are logged, never propagated. Review is a hard gate:
//! low-confidence or urgent work parks in `review` until an operator
//! approves or rejects it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use foreman_agent::{AgentDirectory, GENERAL_AGENT};
use foreman_core::{
    Delegation, DelegationStatus, ForemanError, ForemanResult, Task, TaskPriority, TaskSnapshot,
    TaskStatus,
};
use foreman_llm::{ContextRetriever, GenerationGateway, GenerationRequest, LlmProvider};
use foreman_store::{DelegationStore, TaskStore};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::{Classification, Classifier};
use crate::prompts;

/// Delegations below this confidence park in review instead of
/// completing on their own.
const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// How many retrieved snippets the execution prompt carries.
const CONTEXT_SNIPPETS: usize = 4;

/// Longest result or error excerpt mirrored into task metadata.
const DIGEST_CHARS: usize = 240;

/// Per-request knobs for [`DelegationMachine::delegate`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DelegateOptions {
    /// Skip classification and force this agent.
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Override the configured model for this delegation.
    #[serde(default)]
    pub model: Option<String>,
    /// Override the configured provider for this delegation.
    #[serde(default)]
    pub provider: Option<LlmProvider>,
    /// Record that no human asked for this delegation. Recorded only;
    /// the review gate applies unchanged.
    #[serde(default)]
    pub autonomous: bool,
}

/// What the caller gets back while the executor runs in the background.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DelegationAck {
    /// Identifier of the queued delegation.
    pub delegation_id: Uuid,
    /// The task being executed.
    pub task_id: Uuid,
    /// Resolved agent name.
    pub agent_name: String,
    /// Classifier rationale.
    pub intent: String,
    /// Routing confidence.
    pub confidence: f64,
    /// Always `queued` at acknowledgement time.
    pub status: DelegationStatus,
}

/// Summary of one step of a chain or parallel delegation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DelegationOutcome {
    /// Agent that ran the step.
    pub agent_name: String,
    /// Identifier of the step's delegation record.
    pub delegation_id: Uuid,
    /// Status when the composition returned. Non-terminal when a
    /// parallel wait expired first.
    pub status: DelegationStatus,
    /// Gateway output on success.
    pub result: Option<String>,
    /// Error text on failure.
    pub error: Option<String>,
}

impl From<&Delegation> for DelegationOutcome {
    fn from(delegation: &Delegation) -> Self {
        Self {
            agent_name: delegation.agent_name.clone(),
            delegation_id: delegation.id,
            status: delegation.status,
            result: delegation.result.clone(),
            error: delegation.error.clone(),
        }
    }
}

/// Execution-time overrides threaded to the executor.
#[derive(Debug, Clone, Default)]
struct ExecOptions {
    model: Option<String>,
    provider: Option<LlmProvider>,
    /// Results from earlier chain steps, oldest first.
    context: Vec<String>,
}

/// Owns the full delegation lifecycle: classification, the queued
/// acknowledgement, asynchronous execution, review gates, and
/// chain/parallel composition.
#[derive(Clone)]
pub struct DelegationMachine {
    tasks: Arc<dyn TaskStore>,
    delegations: Arc<dyn DelegationStore>,
    directory: AgentDirectory,
    gateway: Arc<dyn GenerationGateway>,
    retriever: Arc<dyn ContextRetriever>,
    classifier: Arc<Classifier>,
}

impl DelegationMachine {
    /// Wires the machine to its stores, the agent directory, and the
    /// generation gateway. The classifier shares the gateway and gives
    /// up on the model after `classifier_timeout`.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        delegations: Arc<dyn DelegationStore>,
        directory: AgentDirectory,
        gateway: Arc<dyn GenerationGateway>,
        retriever: Arc<dyn ContextRetriever>,
        classifier_timeout: Duration,
    ) -> Self {
        let classifier = Arc::new(Classifier::new(Arc::clone(&gateway), classifier_timeout));
        Self {
            tasks,
            delegations,
            directory,
            gateway,
            retriever,
            classifier,
        }
    }

    /// Classifies a task without delegating it.
    pub async fn classify_task(&self, task_id: Uuid) -> ForemanResult<Classification> {
        let task = self.load_task(task_id).await?;
        Ok(self
            .classifier
            .classify(&task.title, &task.description, &self.directory)
            .await)
    }

    /// Delegates a task: resolves the agent, records a queued
    /// delegation, marks the task `delegated`, and spawns the executor.
    /// Returns immediately with the acknowledgement.
    pub async fn delegate(
        &self,
        task_id: Uuid,
        options: DelegateOptions,
    ) -> ForemanResult<DelegationAck> {
        let task = self.load_task(task_id).await?;

        let classification = match &options.agent_name {
            Some(agent) => Classification::manual(agent.clone()),
            None => {
                self.classifier
                    .classify(&task.title, &task.description, &self.directory)
                    .await
            }
        };
        self.ensure_registered(&classification.agent_name).await?;

        let delegation = self
            .create_queued(
                task_id,
                &classification.agent_name,
                &classification.intent,
                classification.confidence,
                options.autonomous,
            )
            .await?;

        info!(
            task_id = %task_id,
            delegation_id = %delegation.id,
            agent = %classification.agent_name,
            intent = %classification.intent,
            confidence = classification.confidence,
            "Delegation queued"
        );

        let machine = self.clone();
        let delegation_id = delegation.id;
        let exec = ExecOptions {
            model: options.model,
            provider: options.provider,
            context: Vec::new(),
        };
        tokio::spawn(async move {
            if let Err(e) = machine.run_to_completion(delegation_id, &exec).await {
                error!(delegation_id = %delegation_id, error = %e, "Delegation executor error");
            }
        });

        Ok(DelegationAck {
            delegation_id: delegation.id,
            task_id,
            agent_name: classification.agent_name,
            intent: classification.intent,
            confidence: classification.confidence,
            status: DelegationStatus::Queued,
        })
    }

    /// Runs the task through `agents` in order, feeding each result
    /// into the next step's prompt. Stops at the first failure unless
    /// `continue_on_error` is set. Outcomes come back in step order.
    pub async fn delegate_chain(
        &self,
        task_id: Uuid,
        agents: &[String],
        continue_on_error: bool,
    ) -> ForemanResult<Vec<DelegationOutcome>> {
        if agents.is_empty() {
            return Err(ForemanError::Validation(
                "chain requires at least one agent".to_string(),
            ));
        }

        let mut outcomes = Vec::with_capacity(agents.len());
        let mut context: Vec<String> = Vec::new();
        for agent in agents {
            self.ensure_registered(agent).await?;
            let delegation = self
                .create_queued(task_id, agent, "chain-step", 1.0, false)
                .await?;
            let exec = ExecOptions {
                context: context.clone(),
                ..ExecOptions::default()
            };
            let finished = self.run_to_completion(delegation.id, &exec).await?;
            if let Some(result) = &finished.result {
                context.push(format!("Result from {agent}:\n{result}"));
            }
            let failed = finished.status == DelegationStatus::Failed;
            outcomes.push(DelegationOutcome::from(&finished));
            if failed && !continue_on_error {
                warn!(task_id = %task_id, agent = %agent, "Chain stopped at failed step");
                break;
            }
        }
        Ok(outcomes)
    }

    /// Runs the task against every agent concurrently, each against the
    /// same task snapshot. Waits up to `max_wait`; steps still running
    /// when the wait expires keep going in the background and are
    /// reported with their current status.
    pub async fn delegate_parallel(
        &self,
        task_id: Uuid,
        agents: &[String],
        max_wait: Duration,
    ) -> ForemanResult<Vec<DelegationOutcome>> {
        if agents.is_empty() {
            return Err(ForemanError::Validation(
                "parallel delegation requires at least one agent".to_string(),
            ));
        }

        let mut steps = Vec::with_capacity(agents.len());
        for agent in agents {
            self.ensure_registered(agent).await?;
            let delegation = self
                .create_queued(task_id, agent, "parallel-step", 1.0, false)
                .await?;
            steps.push((agent.clone(), delegation.id));
        }

        let handles: Vec<_> = steps
            .iter()
            .map(|(_, delegation_id)| {
                let machine = self.clone();
                let delegation_id = *delegation_id;
                tokio::spawn(async move {
                    machine
                        .run_to_completion(delegation_id, &ExecOptions::default())
                        .await
                })
            })
            .collect();

        match tokio::time::timeout(max_wait, join_all(handles)).await {
            Ok(joined) => {
                let mut outcomes = Vec::with_capacity(steps.len());
                for ((agent, delegation_id), join_result) in steps.into_iter().zip(joined) {
                    match join_result {
                        Ok(Ok(delegation)) => outcomes.push(DelegationOutcome::from(&delegation)),
                        Ok(Err(e)) => outcomes.push(DelegationOutcome {
                            agent_name: agent,
                            delegation_id,
                            status: DelegationStatus::Failed,
                            result: None,
                            error: Some(e.to_string()),
                        }),
                        Err(e) => outcomes.push(DelegationOutcome {
                            agent_name: agent,
                            delegation_id,
                            status: DelegationStatus::Failed,
                            result: None,
                            error: Some(format!("executor panicked: {e}")),
                        }),
                    }
                }
                Ok(outcomes)
            }
            Err(_) => {
                // Dropping the join handles detaches the executors;
                // they keep recording outcomes in the background.
                warn!(task_id = %task_id, "Parallel delegation exceeded max wait");
                let mut outcomes = Vec::with_capacity(steps.len());
                for (agent, delegation_id) in steps {
                    let current = self.delegations.get(delegation_id).await?;
                    outcomes.push(match current {
                        Some(delegation) => DelegationOutcome::from(&delegation),
                        None => DelegationOutcome {
                            agent_name: agent,
                            delegation_id,
                            status: DelegationStatus::Failed,
                            result: None,
                            error: Some("delegation record missing".to_string()),
                        },
                    });
                }
                Ok(outcomes)
            }
        }
    }

    /// Approves a delegation parked in review, completing both the
    /// delegation and its task. Any other status is rejected.
    pub async fn approve(&self, delegation_id: Uuid) -> ForemanResult<Delegation> {
        let mut delegation = self.load_delegation(delegation_id).await?;
        if delegation.status != DelegationStatus::Review {
            return Err(ForemanError::Validation(format!(
                "delegation {delegation_id} is {}, only review can be approved",
                delegation.status
            )));
        }
        delegation.status = DelegationStatus::Completed;
        delegation.completed_at = Some(Utc::now());
        self.delegations.update(&delegation).await?;
        self.mirror_task(delegation.task_id, TaskStatus::Completed, None)
            .await?;
        info!(delegation_id = %delegation_id, task_id = %delegation.task_id, "Delegation approved");
        Ok(delegation)
    }

    /// Rejects a non-terminal delegation. The delegation fails with the
    /// given reason and the task returns to `pending`, unassigned, so
    /// it can be delegated again.
    pub async fn reject(
        &self,
        delegation_id: Uuid,
        reason: Option<String>,
    ) -> ForemanResult<Delegation> {
        let mut delegation = self.load_delegation(delegation_id).await?;
        if delegation.status.is_terminal() {
            return Err(ForemanError::Validation(format!(
                "delegation {delegation_id} is already {}",
                delegation.status
            )));
        }
        let reason = reason.unwrap_or_else(|| "rejected by operator".to_string());
        delegation.status = DelegationStatus::Failed;
        delegation.error = Some(reason.clone());
        delegation.completed_at = Some(Utc::now());
        self.delegations.update(&delegation).await?;

        if let Some(mut task) = self.tasks.get(delegation.task_id).await? {
            if task.status != TaskStatus::Cancelled {
                task.assigned_agent = None;
                task.insert_metadata("last_rejection", serde_json::json!(digest(&reason)));
                task.set_status(TaskStatus::Pending);
                self.tasks.update(&task).await?;
            }
        }
        info!(delegation_id = %delegation_id, task_id = %delegation.task_id, "Delegation rejected");
        Ok(delegation)
    }

    /// Cancels a task that has not reached a terminal status. An
    /// in-flight executor finishes and records its delegation outcome,
    /// but stops mirroring onto the cancelled task.
    pub async fn cancel(&self, task_id: Uuid) -> ForemanResult<Task> {
        let mut task = self.load_task(task_id).await?;
        if task.status.is_terminal() {
            return Err(ForemanError::Validation(format!(
                "task {task_id} is already {}",
                task.status
            )));
        }
        task.set_status(TaskStatus::Cancelled);
        self.tasks.update(&task).await?;
        info!(task_id = %task_id, "Task cancelled");
        Ok(task)
    }

    /// Creates the queued delegation and moves the task to `delegated`.
    /// Cancelled and archived tasks refuse new delegations.
    async fn create_queued(
        &self,
        task_id: Uuid,
        agent_name: &str,
        intent: &str,
        confidence: f64,
        autonomous: bool,
    ) -> ForemanResult<Delegation> {
        let mut task = self.load_task(task_id).await?;
        if matches!(task.status, TaskStatus::Cancelled | TaskStatus::Archived) {
            return Err(ForemanError::Validation(format!(
                "task {task_id} is {} and cannot be delegated",
                task.status
            )));
        }

        let delegation = Delegation::new(
            task_id,
            agent_name,
            intent,
            confidence,
            TaskSnapshot::from(&task),
        );
        self.delegations.create(&delegation).await?;

        task.set_status(TaskStatus::Delegated);
        task.assigned_agent = Some(agent_name.to_string());
        if autonomous {
            task.insert_metadata("autonomous", serde_json::json!(true));
        }
        self.tasks.update(&task).await?;
        Ok(delegation)
    }

    /// Executes one delegation to its resting status and returns the
    /// final record. Gateway failures are recorded on the delegation
    /// and mirrored onto the task; only store failures surface as
    /// errors.
    async fn run_to_completion(
        &self,
        delegation_id: Uuid,
        options: &ExecOptions,
    ) -> ForemanResult<Delegation> {
        let mut delegation = self.load_delegation(delegation_id).await?;
        delegation.status = DelegationStatus::Running;
        delegation.started_at = Some(Utc::now());
        self.delegations.update(&delegation).await?;
        self.mirror_task(delegation.task_id, TaskStatus::InProgress, None)
            .await?;

        let request = self.build_request(&delegation, options).await;
        match self.gateway.generate(&request).await {
            Ok(result) => {
                let needs_review = delegation.confidence < REVIEW_CONFIDENCE_THRESHOLD
                    || delegation.input.priority == TaskPriority::Urgent;
                delegation.status = if needs_review {
                    DelegationStatus::Review
                } else {
                    DelegationStatus::Completed
                };
                delegation.result = Some(result.clone());
                delegation.completed_at = Some(Utc::now());
                self.delegations.update(&delegation).await?;

                let task_status = if needs_review {
                    TaskStatus::Review
                } else {
                    TaskStatus::Completed
                };
                self.mirror_task(
                    delegation.task_id,
                    task_status,
                    Some(("delegation_summary", digest(&result))),
                )
                .await?;
                info!(
                    delegation_id = %delegation.id,
                    agent = %delegation.agent_name,
                    review = needs_review,
                    "Delegation finished"
                );
            }
            Err(e) => {
                let message = e.to_string();
                delegation.status = DelegationStatus::Failed;
                delegation.error = Some(message.clone());
                delegation.completed_at = Some(Utc::now());
                self.delegations.update(&delegation).await?;
                self.mirror_task(
                    delegation.task_id,
                    TaskStatus::Failed,
                    Some(("last_error", digest(&message))),
                )
                .await?;
                error!(
                    delegation_id = %delegation.id,
                    agent = %delegation.agent_name,
                    error = %message,
                    "Delegation failed"
                );
            }
        }
        Ok(delegation)
    }

    /// Assembles the generation request from the agent's role prompt,
    /// the frozen task snapshot, retrieved context, and any chain
    /// results.
    async fn build_request(
        &self,
        delegation: &Delegation,
        options: &ExecOptions,
    ) -> GenerationRequest {
        let query = format!(
            "{} {}",
            delegation.input.title, delegation.input.description
        );
        let snippets = match self.retriever.retrieve(&query, CONTEXT_SNIPPETS).await {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(delegation_id = %delegation.id, error = %e, "Context retrieval failed");
                Vec::new()
            }
        };

        let system = match self.directory.get(&delegation.agent_name).await {
            Some(profile) if !profile.role_prompt.is_empty() => profile.role_prompt,
            _ => prompts::generic_role_prompt(&delegation.agent_name),
        };

        let mut request = GenerationRequest::new(prompts::execution_prompt(
            &delegation.input,
            &options.context,
            &snippets,
        ))
        .with_system(system);
        if let Some(model) = &options.model {
            request = request.with_model(model.clone());
        }
        if let Some(provider) = options.provider {
            request = request.with_provider(provider);
        }
        request
    }

    /// Applies a delegation outcome to the task unless the task was
    /// cancelled while the executor ran. The delegation record keeps
    /// the outcome either way.
    async fn mirror_task(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        note: Option<(&str, String)>,
    ) -> ForemanResult<()> {
        let Some(mut task) = self.tasks.get(task_id).await? else {
            warn!(task_id = %task_id, "Task disappeared under an active delegation");
            return Ok(());
        };
        if task.status == TaskStatus::Cancelled {
            debug!(task_id = %task_id, "Task cancelled; outcome kept on the delegation only");
            return Ok(());
        }
        if let Some((key, value)) = note {
            task.insert_metadata(key, serde_json::json!(value));
        }
        task.set_status(status);
        self.tasks.update(&task).await
    }

    /// Auto-registers an unknown agent so routing decisions always
    /// resolve to a directory entry.
    async fn ensure_registered(&self, agent_name: &str) -> ForemanResult<()> {
        if agent_name != GENERAL_AGENT && !self.directory.contains(agent_name).await {
            self.directory.auto_register(agent_name).await?;
        }
        Ok(())
    }

    async fn load_task(&self, task_id: Uuid) -> ForemanResult<Task> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or_else(|| ForemanError::not_found("task", task_id))
    }

    async fn load_delegation(&self, delegation_id: Uuid) -> ForemanResult<Delegation> {
        self.delegations
            .get(delegation_id)
            .await?
            .ok_or_else(|| ForemanError::not_found("delegation", delegation_id))
    }
}

/// Truncates long model output before it lands in task metadata.
fn digest(text: &str) -> String {
    if text.chars().count() <= DIGEST_CHARS {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(DIGEST_CHARS).collect();
        format!("{truncated}...")
    }
}

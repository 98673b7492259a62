#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end delegation tests over the in-memory store and scripted
//! generation gateways: classification routing, the async executor,
//! review gates, rejection, cancellation, and chain/parallel
//! composition.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use foreman_agent::AgentDirectory;
use foreman_core::{
    Delegation, DelegationStatus, ForemanError, ForemanResult, Task, TaskPriority, TaskStatus,
};
use foreman_delegate::{DelegateOptions, DelegationMachine};
use foreman_llm::{GenerationGateway, GenerationRequest, NullRetriever};
use foreman_store::{AgentStore, DelegationStore, MemoryStore, TaskStore};
use uuid::Uuid;

// --- Test gateways ---

/// Always answers with the same text, or always fails.
struct MockGateway {
    reply: String,
    fail: bool,
}

impl MockGateway {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl GenerationGateway for MockGateway {
    async fn generate(&self, _request: &GenerationRequest) -> ForemanResult<String> {
        if self.fail {
            Err(ForemanError::Gateway("mock gateway failure".to_string()))
        } else {
            Ok(self.reply.clone())
        }
    }
}

/// Pops scripted replies in order and records every request it saw.
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn generate(&self, request: &GenerationRequest) -> ForemanResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ForemanError::Gateway(message)),
            None => Ok("unscripted reply".to_string()),
        }
    }
}

/// Sleeps before answering, for timeout paths.
struct SlowGateway {
    delay: Duration,
    reply: String,
}

#[async_trait]
impl GenerationGateway for SlowGateway {
    async fn generate(&self, _request: &GenerationRequest) -> ForemanResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

// --- Harness ---

struct Harness {
    store: Arc<MemoryStore>,
    directory: AgentDirectory,
    machine: DelegationMachine,
}

async fn harness(gateway: Arc<dyn GenerationGateway>) -> Harness {
    harness_with_timeout(gateway, Duration::from_secs(5)).await
}

async fn harness_with_timeout(
    gateway: Arc<dyn GenerationGateway>,
    classifier_timeout: Duration,
) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let directory = AgentDirectory::new(store.clone() as Arc<dyn AgentStore>);
    directory.bootstrap().await.unwrap();
    let machine = DelegationMachine::new(
        store.clone() as Arc<dyn TaskStore>,
        store.clone() as Arc<dyn DelegationStore>,
        directory.clone(),
        gateway,
        Arc::new(NullRetriever),
        classifier_timeout,
    );
    Harness {
        store,
        directory,
        machine,
    }
}

async fn seed_task(store: &MemoryStore, title: &str, description: &str) -> Task {
    seed_task_with_priority(store, title, description, TaskPriority::Medium).await
}

async fn seed_task_with_priority(
    store: &MemoryStore,
    title: &str,
    description: &str,
    priority: TaskPriority,
) -> Task {
    let task = Task::new(title, description, priority);
    TaskStore::create(store, &task).await.unwrap();
    task
}

/// Polls until the delegation satisfies `pred` or the test gives up.
async fn wait_for_delegation<F>(store: &MemoryStore, id: Uuid, pred: F) -> Delegation
where
    F: Fn(&Delegation) -> bool,
{
    for _ in 0..400 {
        if let Some(delegation) = DelegationStore::get(store, id).await.unwrap() {
            if pred(&delegation) {
                return delegation;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("delegation {id} never reached the expected state");
}

async fn wait_for_resting(store: &MemoryStore, id: Uuid) -> Delegation {
    wait_for_delegation(store, id, |d| {
        d.status.is_terminal() || d.status == DelegationStatus::Review
    })
    .await
}

// --- Classification and acknowledgement ---

#[tokio::test]
async fn test_keyword_task_routes_to_coding_agent() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Fix login bug", "Users cannot sign in").await;

    let ack = h
        .machine
        .delegate(task.id, DelegateOptions::default())
        .await
        .unwrap();

    assert_eq!(ack.agent_name, "coding-agent");
    assert!(ack.intent.starts_with("keyword-match("));
    assert_eq!(ack.status, DelegationStatus::Queued);

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.assigned_agent.as_deref(), Some("coding-agent"));
}

#[tokio::test]
async fn test_classify_preview_leaves_task_untouched() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Fix login bug", "Users cannot sign in").await;

    let decision = h.machine.classify_task(task.id).await.unwrap();
    assert_eq!(decision.agent_name, "coding-agent");

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Pending);
    assert!(stored.assigned_agent.is_none());
    assert!(DelegationStore::list_for_task(h.store.as_ref(), task.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delegate_unknown_task_is_not_found() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let err = h
        .machine
        .delegate(Uuid::new_v4(), DelegateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ForemanError::NotFound { .. }));
}

#[tokio::test]
async fn test_unmatched_task_falls_back_to_generalist() {
    // The mock reply "done" matches no agent name, so the model phase
    // yields nothing and the generalist takes the task at 0.3.
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Water the plants", "Front garden only").await;

    let ack = h
        .machine
        .delegate(task.id, DelegateOptions::default())
        .await
        .unwrap();

    assert_eq!(ack.agent_name, "general-agent");
    assert_eq!(ack.intent, "default-fallback");
    assert_eq!(ack.confidence, 0.3);

    // 0.3 is under the review threshold, so the outcome parks in review.
    let delegation = wait_for_resting(&h.store, ack.delegation_id).await;
    assert_eq!(delegation.status, DelegationStatus::Review);
}

#[tokio::test]
async fn test_classifier_model_timeout_falls_back() {
    let gateway = Arc::new(SlowGateway {
        delay: Duration::from_millis(300),
        reply: "research-agent".to_string(),
    });
    let h = harness_with_timeout(gateway, Duration::from_millis(40)).await;
    let task = seed_task(&h.store, "Water the plants", "Front garden only").await;

    let ack = h
        .machine
        .delegate(task.id, DelegateOptions::default())
        .await
        .unwrap();
    assert_eq!(ack.agent_name, "general-agent");
    assert_eq!(ack.intent, "default-fallback");
}

#[tokio::test]
async fn test_forced_agent_skips_classification() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Anything", "at all").await;

    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("email-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(ack.agent_name, "email-agent");
    assert_eq!(ack.intent, "manual-assignment");
    assert_eq!(ack.confidence, 1.0);
}

#[tokio::test]
async fn test_unknown_forced_agent_is_auto_registered() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Translate the release notes", "to French").await;

    h.machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("translator-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();

    let profile = h.directory.get("translator-agent").await.unwrap();
    assert!(profile.auto_registered);
    assert!(!profile.suggesting);

    // The placeholder is persisted, not just cached.
    let stored = AgentStore::get(h.store.as_ref(), "translator-agent")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.auto_registered);
}

// --- Executor outcomes ---

#[tokio::test]
async fn test_confident_delegation_completes_task() {
    let h = harness(Arc::new(MockGateway::replying("patched the login flow"))).await;
    let task = seed_task(&h.store, "Fix login bug", "Users cannot sign in").await;

    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("coding-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();

    let delegation = wait_for_resting(&h.store, ack.delegation_id).await;
    assert_eq!(delegation.status, DelegationStatus::Completed);
    assert_eq!(delegation.result.as_deref(), Some("patched the login flow"));
    assert!(delegation.started_at.is_some());
    assert!(delegation.completed_at.is_some());

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(
        stored.metadata.get("delegation_summary").and_then(|v| v.as_str()),
        Some("patched the login flow")
    );
}

#[tokio::test]
async fn test_urgent_delegation_parks_in_review() {
    let h = harness(Arc::new(MockGateway::replying("draft reply"))).await;
    let task = seed_task_with_priority(
        &h.store,
        "Reply to the auditor",
        "They need numbers today",
        TaskPriority::Urgent,
    )
    .await;

    // Forced assignment carries confidence 1.0; urgency alone gates it.
    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("email-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();

    let delegation = wait_for_resting(&h.store, ack.delegation_id).await;
    assert_eq!(delegation.status, DelegationStatus::Review);
    assert_eq!(delegation.result.as_deref(), Some("draft reply"));

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Review);
}

#[tokio::test]
async fn test_gateway_failure_fails_delegation_and_task() {
    let h = harness(Arc::new(MockGateway::failing())).await;
    let task = seed_task(&h.store, "Anything", "at all").await;

    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("coding-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();

    let delegation = wait_for_resting(&h.store, ack.delegation_id).await;
    assert_eq!(delegation.status, DelegationStatus::Failed);
    assert!(delegation.error.as_deref().unwrap().contains("mock gateway failure"));

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.metadata.contains_key("last_error"));
}

#[tokio::test]
async fn test_autonomous_flag_is_recorded() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Anything", "at all").await;

    h.machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("coding-agent".to_string()),
                autonomous: true,
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(
        stored.metadata.get("autonomous").and_then(|v| v.as_bool()),
        Some(true)
    );
}

// --- Review gates ---

#[tokio::test]
async fn test_approve_completes_reviewed_delegation() {
    let h = harness(Arc::new(MockGateway::replying("draft reply"))).await;
    let task = seed_task_with_priority(
        &h.store,
        "Reply to the auditor",
        "They need numbers today",
        TaskPriority::Urgent,
    )
    .await;
    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("email-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();
    wait_for_resting(&h.store, ack.delegation_id).await;

    let approved = h.machine.approve(ack.delegation_id).await.unwrap();
    assert_eq!(approved.status, DelegationStatus::Completed);

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_approve_rejects_non_review_delegation() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Anything", "at all").await;
    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("coding-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();
    wait_for_resting(&h.store, ack.delegation_id).await;

    let err = h.machine.approve(ack.delegation_id).await.unwrap_err();
    assert!(matches!(err, ForemanError::Validation(_)));
}

#[tokio::test]
async fn test_reject_returns_task_to_pending() {
    let h = harness(Arc::new(MockGateway::replying("draft reply"))).await;
    let task = seed_task_with_priority(
        &h.store,
        "Reply to the auditor",
        "They need numbers today",
        TaskPriority::Urgent,
    )
    .await;
    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("email-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();
    wait_for_resting(&h.store, ack.delegation_id).await;

    let rejected = h
        .machine
        .reject(ack.delegation_id, Some("numbers are wrong".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, DelegationStatus::Failed);
    assert_eq!(rejected.error.as_deref(), Some("numbers are wrong"));

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Pending);
    assert!(stored.assigned_agent.is_none());
    assert_eq!(
        stored.metadata.get("last_rejection").and_then(|v| v.as_str()),
        Some("numbers are wrong")
    );
}

#[tokio::test]
async fn test_reject_refuses_terminal_delegation() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Anything", "at all").await;
    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("coding-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();
    wait_for_resting(&h.store, ack.delegation_id).await;

    let err = h.machine.reject(ack.delegation_id, None).await.unwrap_err();
    assert!(matches!(err, ForemanError::Validation(_)));
}

// --- Cancellation ---

#[tokio::test]
async fn test_cancelled_task_keeps_status_after_executor_finishes() {
    let gateway = Arc::new(SlowGateway {
        delay: Duration::from_millis(150),
        reply: "finished anyway".to_string(),
    });
    let h = harness(gateway).await;
    let task = seed_task(&h.store, "Anything", "at all").await;

    let ack = h
        .machine
        .delegate(
            task.id,
            DelegateOptions {
                agent_name: Some("coding-agent".to_string()),
                ..DelegateOptions::default()
            },
        )
        .await
        .unwrap();
    h.machine.cancel(task.id).await.unwrap();

    let delegation = wait_for_resting(&h.store, ack.delegation_id).await;
    assert_eq!(delegation.status, DelegationStatus::Completed);
    assert_eq!(delegation.result.as_deref(), Some("finished anyway"));

    let stored = TaskStore::get(h.store.as_ref(), task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
    assert!(!stored.metadata.contains_key("delegation_summary"));
}

#[tokio::test]
async fn test_cancelled_task_refuses_new_delegation() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Anything", "at all").await;
    h.machine.cancel(task.id).await.unwrap();

    let err = h
        .machine
        .delegate(task.id, DelegateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ForemanError::Validation(_)));
}

// --- Composition ---

#[tokio::test]
async fn test_chain_feeds_results_forward() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Ok("sources gathered".to_string()),
        Ok("summary written".to_string()),
    ]));
    let h = harness(gateway.clone()).await;
    let task = seed_task(&h.store, "Brief the board", "Q3 market outlook").await;

    let agents = vec!["research-agent".to_string(), "email-agent".to_string()];
    let outcomes = h.machine.delegate_chain(task.id, &agents, false).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].agent_name, "research-agent");
    assert_eq!(outcomes[0].status, DelegationStatus::Completed);
    assert_eq!(outcomes[1].agent_name, "email-agent");
    assert_eq!(outcomes[1].result.as_deref(), Some("summary written"));

    let requests = gateway.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].prompt.contains("Results from earlier agents"));
    assert!(requests[1]
        .prompt
        .contains("Result from research-agent:\nsources gathered"));
}

#[tokio::test]
async fn test_chain_stops_at_first_failure() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Err("model unreachable".to_string()),
        Ok("never used".to_string()),
    ]));
    let h = harness(gateway.clone()).await;
    let task = seed_task(&h.store, "Brief the board", "Q3 market outlook").await;

    let agents = vec!["research-agent".to_string(), "email-agent".to_string()];
    let outcomes = h.machine.delegate_chain(task.id, &agents, false).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, DelegationStatus::Failed);
    assert_eq!(gateway.requests().len(), 1);
}

#[tokio::test]
async fn test_chain_continue_on_error_runs_every_step() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Err("model unreachable".to_string()),
        Ok("recovered".to_string()),
    ]));
    let h = harness(gateway.clone()).await;
    let task = seed_task(&h.store, "Brief the board", "Q3 market outlook").await;

    let agents = vec!["research-agent".to_string(), "email-agent".to_string()];
    let outcomes = h.machine.delegate_chain(task.id, &agents, true).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status, DelegationStatus::Failed);
    assert_eq!(outcomes[1].status, DelegationStatus::Completed);
}

#[tokio::test]
async fn test_chain_with_no_agents_is_rejected() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Anything", "at all").await;
    let err = h.machine.delegate_chain(task.id, &[], false).await.unwrap_err();
    assert!(matches!(err, ForemanError::Validation(_)));
}

#[tokio::test]
async fn test_parallel_runs_every_agent() {
    let h = harness(Arc::new(MockGateway::replying("done"))).await;
    let task = seed_task(&h.store, "Evaluate the vendor", "Pricing and references").await;

    let agents = vec!["research-agent".to_string(), "investment-agent".to_string()];
    let outcomes = h
        .machine
        .delegate_parallel(task.id, &agents, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    let mut names: Vec<&str> = outcomes.iter().map(|o| o.agent_name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["investment-agent", "research-agent"]);
    assert!(outcomes
        .iter()
        .all(|o| o.status == DelegationStatus::Completed));

    // Two parallel attempts over the same task leave two records.
    let rows = DelegationStore::list_for_task(h.store.as_ref(), task.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_parallel_wait_expiry_reports_running_steps() {
    let gateway = Arc::new(SlowGateway {
        delay: Duration::from_millis(400),
        reply: "late result".to_string(),
    });
    let h = harness(gateway).await;
    let task = seed_task(&h.store, "Evaluate the vendor", "Pricing and references").await;

    let agents = vec!["research-agent".to_string()];
    let outcomes = h
        .machine
        .delegate_parallel(task.id, &agents, Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].status.is_terminal());

    // The detached executor still lands the outcome afterwards.
    let delegation = wait_for_resting(&h.store, outcomes[0].delegation_id).await;
    assert_eq!(delegation.status, DelegationStatus::Completed);
    assert_eq!(delegation.result.as_deref(), Some("late result"));
}

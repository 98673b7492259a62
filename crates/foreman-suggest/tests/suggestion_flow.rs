#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end suggestion pipeline tests over the in-memory store:
//! ingestion (idempotence, rate limiting, debounce), generation with
//! prerequisite gating, clustering, triage, and the cycle sweep.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use foreman_agent::AgentDirectory;
use foreman_core::{
    ForemanError, ForemanResult, Suggestion, SuggestionSource, SuggestionStatus, Task,
    TaskPriority, TaskStatus, TurnRole,
};
use foreman_delegate::DelegationMachine;
use foreman_llm::{GenerationGateway, GenerationRequest, NullRetriever};
use foreman_store::{AgentStore, DelegationStore, MemoryStore, SuggestionStore, TaskStore};
use foreman_suggest::{
    Credentials, IngestRequest, SuggestSettings, SuggestionCycle, SuggestionService,
};

// --- Test gateways ---

/// Always answers with the same text. Backs the delegation machine.
struct MockGateway {
    reply: String,
}

#[async_trait]
impl GenerationGateway for MockGateway {
    async fn generate(&self, _request: &GenerationRequest) -> ForemanResult<String> {
        Ok(self.reply.clone())
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

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn generate(&self, request: &GenerationRequest) -> ForemanResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ForemanError::Gateway(message)),
            None => Ok("unscripted reply".to_string()),
        }
    }
}

// --- Harness ---

struct Harness {
    store: Arc<MemoryStore>,
    service: Arc<SuggestionService>,
    gateway: Arc<ScriptedGateway>,
}

fn fast_settings() -> SuggestSettings {
    SuggestSettings {
        debounce: Duration::ZERO,
        ..SuggestSettings::default()
    }
}

fn full_credentials() -> Credentials {
    Credentials {
        smtp_host: Some("smtp.example.com".to_string()),
        market_data_api_key: Some("key".to_string()),
        codebase_index_dir: Some("/srv/index".to_string()),
    }
}

async fn harness(credentials: Credentials, script: Vec<Result<String, String>>) -> Harness {
    harness_with_settings(credentials, fast_settings(), script).await
}

async fn harness_with_settings(
    credentials: Credentials,
    settings: SuggestSettings,
    script: Vec<Result<String, String>>,
) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let directory = AgentDirectory::new(store.clone() as Arc<dyn AgentStore>);
    directory.bootstrap().await.unwrap();

    let machine = DelegationMachine::new(
        store.clone() as Arc<dyn TaskStore>,
        store.clone() as Arc<dyn DelegationStore>,
        directory.clone(),
        Arc::new(MockGateway {
            reply: "done".to_string(),
        }),
        Arc::new(NullRetriever),
        Duration::from_secs(5),
    );

    let gateway = Arc::new(ScriptedGateway::new(script));
    let service = Arc::new(SuggestionService::new(
        store.clone() as Arc<dyn SuggestionStore>,
        store.clone() as Arc<dyn TaskStore>,
        store.clone() as Arc<dyn DelegationStore>,
        directory,
        gateway.clone(),
        machine,
        settings,
        credentials,
    ));
    Harness {
        store,
        service,
        gateway,
    }
}

fn request(agent: &str, title: &str, body: &str) -> IngestRequest {
    IngestRequest {
        agent_name: agent.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        confidence: None,
        tags: Vec::new(),
    }
}

async fn seed_task(store: &MemoryStore, title: &str, description: &str) {
    let task = Task::new(title, description, TaskPriority::Medium);
    TaskStore::create(store, &task).await.unwrap();
}

// --- Ingestion ---

#[tokio::test]
async fn test_ingest_creates_pending_suggestion() {
    let h = harness(full_credentials(), Vec::new()).await;
    let (suggestion, created) = h
        .service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();

    assert!(created);
    assert_eq!(suggestion.status, SuggestionStatus::Pending);
    assert_eq!(suggestion.data_source, SuggestionSource::Ingested);
    assert_eq!(suggestion.confidence, 0.5);
    assert_eq!(suggestion.fingerprint.len(), 64);
    assert!(suggestion.expires_at.is_some());
}

#[tokio::test]
async fn test_ingest_replay_returns_existing_row() {
    let h = harness(full_credentials(), Vec::new()).await;
    let payload = request("email-agent", "Clean inbox", "Too many newsletters");
    let (first, created) = h.service.ingest(payload.clone()).await.unwrap();
    assert!(created);

    // Replays come back idempotent and free of rate-limit cost, so a
    // chatty pusher resending one payload never gets throttled.
    for _ in 0..10 {
        let (again, created) = h.service.ingest(payload.clone()).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
    }
}

#[tokio::test]
async fn test_ingest_sixth_distinct_push_is_rate_limited() {
    let h = harness(full_credentials(), Vec::new()).await;
    for i in 0..5 {
        h.service
            .ingest(request("email-agent", &format!("Idea {i}"), "body"))
            .await
            .unwrap();
    }
    let denied = h
        .service
        .ingest(request("email-agent", "Idea 5", "body"))
        .await
        .unwrap_err();
    assert!(matches!(denied, ForemanError::RateLimited { scope } if scope == "email-agent"));

    // Another agent still has budget.
    assert!(h
        .service
        .ingest(request("coding-agent", "Idea", "body"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_ingest_debounce_hides_row_until_horizon() {
    let h = harness_with_settings(
        full_credentials(),
        SuggestSettings {
            debounce: Duration::from_millis(80),
            ..SuggestSettings::default()
        },
        Vec::new(),
    )
    .await;
    h.service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();

    let visible = h.service.list(None, Some(SuggestionStatus::Pending)).await.unwrap();
    assert!(visible.is_empty());

    tokio::time::sleep(Duration::from_millis(120)).await;
    let visible = h.service.list(None, Some(SuggestionStatus::Pending)).await.unwrap();
    assert_eq!(visible.len(), 1);
}

#[tokio::test]
async fn test_ingest_same_content_after_expiry_creates_new_row() {
    let h = harness(full_credentials(), Vec::new()).await;
    let payload = request("email-agent", "Clean inbox", "Too many newsletters");
    let (first, _) = h.service.ingest(payload.clone()).await.unwrap();

    let mut stale = first.clone();
    stale.expires_at = Some(Utc::now() - ChronoDuration::minutes(1));
    SuggestionStore::update(h.store.as_ref(), &stale).await.unwrap();
    assert_eq!(h.service.expire_due().await.unwrap(), 1);

    let (second, created) = h.service.ingest(payload).await.unwrap();
    assert!(created);
    assert_ne!(second.id, first.id);
    assert_eq!(second.fingerprint, first.fingerprint);
}

#[tokio::test]
async fn test_ingest_rejects_blank_title() {
    let h = harness(full_credentials(), Vec::new()).await;
    let err = h
        .service
        .ingest(request("email-agent", "   ", "body"))
        .await
        .unwrap_err();
    assert!(matches!(err, ForemanError::Validation(_)));
}

// --- Triage ---

#[tokio::test]
async fn test_accept_creates_task_and_delegates_to_originating_agent() {
    let h = harness(full_credentials(), Vec::new()).await;
    let (suggestion, _) = h
        .service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();

    let (accepted, task) = h.service.accept(suggestion.id).await.unwrap();
    assert_eq!(accepted.status, SuggestionStatus::Accepted);
    assert_eq!(accepted.accepted_task_id, Some(task.id));
    assert_eq!(task.title, "Clean inbox");
    assert_eq!(task.assigned_agent.as_deref(), Some("email-agent"));
    assert_ne!(task.status, TaskStatus::Pending);
    assert_eq!(
        task.metadata.get("suggested_by").and_then(|v| v.as_str()),
        Some("email-agent")
    );
    assert!(task.metadata.contains_key("suggestion_id"));
}

#[tokio::test]
async fn test_accept_twice_is_rejected() {
    let h = harness(full_credentials(), Vec::new()).await;
    let (suggestion, _) = h
        .service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();
    h.service.accept(suggestion.id).await.unwrap();

    let err = h.service.accept(suggestion.id).await.unwrap_err();
    assert!(matches!(err, ForemanError::Validation(_)));
}

#[tokio::test]
async fn test_reject_keeps_reason_in_metadata() {
    let h = harness(full_credentials(), Vec::new()).await;
    let (suggestion, _) = h
        .service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();

    let rejected = h
        .service
        .reject(suggestion.id, Some("not this week".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, SuggestionStatus::Rejected);
    assert_eq!(
        rejected.metadata.get("rejection_reason").and_then(|v| v.as_str()),
        Some("not this week")
    );
}

#[tokio::test]
async fn test_reply_appends_turns_and_applies_amendments() {
    let script = vec![Ok(
        r#"{"reply": "I will start with the oldest.", "title": "Clean inbox, oldest first"}"#
            .to_string(),
    )];
    let h = harness(full_credentials(), script).await;
    let (suggestion, _) = h
        .service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();

    let updated = h
        .service
        .reply(suggestion.id, "Which ones would you tackle first?")
        .await
        .unwrap();

    assert_eq!(updated.conversation.len(), 2);
    assert_eq!(updated.conversation[0].role, TurnRole::User);
    assert_eq!(updated.conversation[1].role, TurnRole::Agent);
    assert_eq!(updated.conversation[1].text, "I will start with the oldest.");
    assert_eq!(updated.title, "Clean inbox, oldest first");
    // The body was not amended.
    assert_eq!(updated.description, "Too many newsletters");
}

#[tokio::test]
async fn test_reply_gateway_failure_appends_canned_turn() {
    let script = vec![Err("model unreachable".to_string())];
    let h = harness(full_credentials(), script).await;
    let (suggestion, _) = h
        .service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();

    let updated = h
        .service
        .reply(suggestion.id, "Which ones first?")
        .await
        .unwrap();

    assert_eq!(updated.conversation.len(), 2);
    assert!(updated.conversation[1].text.starts_with("Noted."));
    assert_eq!(updated.title, "Clean inbox");
}

#[tokio::test]
async fn test_reply_unparseable_answer_appends_canned_turn() {
    let script = vec![Ok("sounds good, will do!".to_string())];
    let h = harness(full_credentials(), script).await;
    let (suggestion, _) = h
        .service
        .ingest(request("email-agent", "Clean inbox", "Too many newsletters"))
        .await
        .unwrap();

    let updated = h.service.reply(suggestion.id, "Go ahead?").await.unwrap();
    assert!(updated.conversation[1].text.starts_with("Noted."));
}

#[tokio::test]
async fn test_expire_due_sweeps_only_overdue_pending_rows() {
    let h = harness(full_credentials(), Vec::new()).await;
    let (fresh, _) = h
        .service
        .ingest(request("email-agent", "Fresh idea", "body"))
        .await
        .unwrap();
    let (old, _) = h
        .service
        .ingest(request("email-agent", "Old idea", "body"))
        .await
        .unwrap();
    let mut stale = old.clone();
    stale.expires_at = Some(Utc::now() - ChronoDuration::minutes(1));
    SuggestionStore::update(h.store.as_ref(), &stale).await.unwrap();

    assert_eq!(h.service.expire_due().await.unwrap(), 1);

    let swept = h.service.get(old.id).await.unwrap();
    assert_eq!(swept.status, SuggestionStatus::Expired);
    let kept = h.service.get(fresh.id).await.unwrap();
    assert_eq!(kept.status, SuggestionStatus::Pending);
}

// --- Generation ---

#[tokio::test]
async fn test_generation_prerequisite_gate_skips_the_model() {
    let mut credentials = full_credentials();
    credentials.smtp_host = None;
    let h = harness(credentials, Vec::new()).await;
    seed_task(&h.store, "Plan the week", "Monday review").await;

    let created = h.service.generate_for_agent("email-agent").await.unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "Connect your mail account");
    assert_eq!(created[0].confidence, 1.0);
    assert_eq!(created[0].data_source, SuggestionSource::PrerequisiteCheck);
    assert_eq!(h.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_generation_keeps_at_most_three_items() {
    let array = r#"[
        {"title": "Unsubscribe from stale newsletters", "description": "40 unread", "priority": "low", "tags": ["inbox"]},
        {"title": "Archive old threads", "description": "2019 era"},
        {"title": "Set up a VIP filter", "description": "From your manager"},
        {"title": "Fourth idea", "description": "dropped"}
    ]"#;
    let h = harness(full_credentials(), vec![Ok(array.to_string())]).await;
    seed_task(&h.store, "Plan the week", "Monday review").await;

    let created = h.service.generate_for_agent("email-agent").await.unwrap();

    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|s| s.confidence == 0.7));
    assert!(created.iter().all(|s| s.expires_at.is_some()));
    assert!(created.iter().all(|s| s.data_source == SuggestionSource::Generated));
    assert!(created.iter().all(|s| s.fingerprint.len() == 64));
    assert_eq!(h.gateway.request_count(), 1);
}

#[tokio::test]
async fn test_generation_skips_titles_already_pending() {
    let array = r#"[{"title": "Archive old threads", "description": "2019 era"}]"#;
    let h = harness(
        full_credentials(),
        vec![Ok(array.to_string()), Ok(array.to_string())],
    )
    .await;
    seed_task(&h.store, "Plan the week", "Monday review").await;

    let first = h.service.generate_for_agent("email-agent").await.unwrap();
    assert_eq!(first.len(), 1);
    let second = h.service.generate_for_agent("email-agent").await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_generation_tolerates_prose_output() {
    let h = harness(
        full_credentials(),
        vec![Ok("I have no suggestions today.".to_string())],
    )
    .await;
    seed_task(&h.store, "Plan the week", "Monday review").await;

    let created = h.service.generate_for_agent("email-agent").await.unwrap();
    assert!(created.is_empty());
}

#[tokio::test]
async fn test_generation_skips_non_suggesting_agent() {
    let h = harness(full_credentials(), Vec::new()).await;
    seed_task(&h.store, "Plan the week", "Monday review").await;

    let created = h.service.generate_for_agent("general-agent").await.unwrap();
    assert!(created.is_empty());
    assert_eq!(h.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_generation_unknown_agent_is_not_found() {
    let h = harness(full_credentials(), Vec::new()).await;
    let err = h.service.generate_for_agent("ghost-agent").await.unwrap_err();
    assert!(matches!(err, ForemanError::NotFound { .. }));
}

// --- Summary ---

#[tokio::test]
async fn test_summarize_clusters_near_duplicates_and_ranks() {
    let h = harness(full_credentials(), Vec::new()).await;
    let mut near_a = request(
        "email-agent",
        "Unsubscribe from stale newsletters",
        "Your inbox carries 40 stale newsletters",
    );
    near_a.confidence = Some(0.9);
    let mut near_b = request(
        "email-agent",
        "Unsubscribe from stale newsletters this week",
        "Your inbox carries 40 stale newsletters today",
    );
    near_b.confidence = Some(0.6);
    let mut other = request("coding-agent", "Rotate the API keys", "Production keys are a year old");
    other.confidence = Some(0.8);
    h.service.ingest(near_a).await.unwrap();
    h.service.ingest(near_b).await.unwrap();
    h.service.ingest(other).await.unwrap();

    let clusters = h.service.summarize(None, 0.0).await.unwrap();
    assert_eq!(clusters.len(), 2);
    // coding-agent trust 1.0 puts the key rotation first.
    assert_eq!(clusters[0].representative.title, "Rotate the API keys");
    let newsletters = clusters
        .iter()
        .find(|c| c.representative.title.starts_with("Unsubscribe"))
        .unwrap();
    assert_eq!(newsletters.size, 2);
    assert_eq!(
        newsletters.representative.title,
        "Unsubscribe from stale newsletters"
    );

    let strong_only = h.service.summarize(None, 0.7).await.unwrap();
    assert_eq!(strong_only.len(), 1);
    assert_eq!(strong_only[0].representative.title, "Rotate the API keys");
}

// --- Cycle ---

#[tokio::test]
async fn test_cycle_pass_survives_agent_failures_and_still_sweeps() {
    let script = vec![
        Err("model down".to_string()),
        Err("model down".to_string()),
        Err("model down".to_string()),
        Err("model down".to_string()),
    ];
    let h = harness(full_credentials(), script).await;
    seed_task(&h.store, "Rebalance the portfolio", "Drifted 7% from target").await;

    let stale = Suggestion::new("email-agent", "Old idea", "stale")
        .with_expires_at(Utc::now() - ChronoDuration::minutes(5));
    SuggestionStore::create(h.store.as_ref(), &stale).await.unwrap();

    let cycle = SuggestionCycle::new(h.service.clone());
    cycle.run_once().await;

    let swept = h.service.get(stale.id).await.unwrap();
    assert_eq!(swept.status, SuggestionStatus::Expired);
    // Every suggesting agent was attempted despite the failures.
    assert_eq!(h.gateway.request_count(), 4);
}

//! The suggestion service: ingestion, triage, and expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use foreman_agent::AgentDirectory;
use foreman_core::{
    ConversationTurn, ForemanError, ForemanResult, Suggestion, SuggestionSource, SuggestionStatus,
    Task, TurnRole,
};
use foreman_delegate::{DelegateOptions, DelegationMachine};
use foreman_llm::{extract, GenerationGateway, GenerationRequest};
use foreman_store::{DelegationStore, SuggestionStore, TaskStore};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cluster::{self, ScoredSuggestion, SuggestionCluster};
use crate::limiter::RateLimiter;

/// Sustained rate-limit window.
const SUSTAINED_WINDOW: Duration = Duration::from_secs(60);

/// Reply appended when the agent cannot be reached or answers with
/// nothing usable.
const CANNED_REPLY: &str =
    "Noted. I could not reach the agent for a proper answer right now; the suggestion stands as written.";

const REPLY_SYSTEM_PROMPT: &str = "\
You are the agent that made a suggestion, answering the human reviewing it.

Rules:
1. Reply with a JSON object and nothing else.
2. The object must carry a \"reply\" string for the human.
3. Include \"title\" or \"description\" only to amend the suggestion.
4. Keep the reply short and concrete.";

/// Pipeline tuning knobs, mirrored from the `[suggestions]` config
/// section.
#[derive(Debug, Clone)]
pub struct SuggestSettings {
    /// Background cycle period.
    pub cycle_interval: Duration,
    /// How long a pending suggestion lives before the expiry sweep
    /// takes it.
    pub ttl: Duration,
    /// How long an ingested suggestion stays hidden from listings.
    pub debounce: Duration,
    /// Ingestion hits allowed per agent inside the burst window.
    pub burst_limit: usize,
    /// The burst window.
    pub burst_window: Duration,
    /// Ingestion hits allowed per agent per minute.
    pub minute_limit: usize,
}

impl Default for SuggestSettings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(300),
            ttl: Duration::from_secs(86_400),
            debounce: Duration::from_millis(5_000),
            burst_limit: 5,
            burst_window: Duration::from_secs(10),
            minute_limit: 30,
        }
    }
}

/// Setup state the prerequisite checks inspect. Presence of a value
/// means the matching integration is configured.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Credentials {
    /// Mail server for the email agent.
    pub smtp_host: Option<String>,
    /// Market data feed for the investment agent.
    pub market_data_api_key: Option<String>,
    /// Indexed codebase location for the coding agent.
    pub codebase_index_dir: Option<String>,
}

/// Payload pushed in through the ingest endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IngestRequest {
    /// Agent the suggestion is attributed to.
    pub agent_name: String,
    /// Short summary.
    pub title: String,
    /// Free-form body.
    pub body: String,
    /// Agent-reported confidence; defaults to 0.5.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Clustering tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Owns the suggestion pipeline: push ingestion, periodic generation
/// (see the generation module), human triage, and the expiry sweep.
pub struct SuggestionService {
    pub(crate) suggestions: Arc<dyn SuggestionStore>,
    pub(crate) tasks: Arc<dyn TaskStore>,
    pub(crate) delegations: Arc<dyn DelegationStore>,
    pub(crate) directory: AgentDirectory,
    pub(crate) gateway: Arc<dyn GenerationGateway>,
    machine: DelegationMachine,
    limiter: RateLimiter,
    pub(crate) settings: SuggestSettings,
    pub(crate) credentials: Credentials,
}

impl SuggestionService {
    /// Wires the service to its stores and collaborators.
    pub fn new(
        suggestions: Arc<dyn SuggestionStore>,
        tasks: Arc<dyn TaskStore>,
        delegations: Arc<dyn DelegationStore>,
        directory: AgentDirectory,
        gateway: Arc<dyn GenerationGateway>,
        machine: DelegationMachine,
        settings: SuggestSettings,
        credentials: Credentials,
    ) -> Self {
        let limiter = RateLimiter::new(
            settings.burst_limit,
            settings.burst_window,
            settings.minute_limit,
            SUSTAINED_WINDOW,
        );
        Self {
            suggestions,
            tasks,
            delegations,
            directory,
            gateway,
            machine,
            limiter,
            settings,
            credentials,
        }
    }

    /// The directory this service generates against.
    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    /// The configured cycle period.
    pub fn cycle_interval(&self) -> Duration {
        self.settings.cycle_interval
    }

    /// Ingests a pushed suggestion. Returns the row and whether it was
    /// newly created: a fingerprint already awaiting triage comes back
    /// as-is, making replays free. New content pays the per-agent rate
    /// limit and stays hidden until the debounce horizon passes.
    pub async fn ingest(&self, request: IngestRequest) -> ForemanResult<(Suggestion, bool)> {
        if request.title.trim().is_empty() || request.agent_name.trim().is_empty() {
            return Err(ForemanError::Validation(
                "ingest requires a non-empty title and agent name".to_string(),
            ));
        }

        let fingerprint = content_fingerprint(&request.agent_name, &request.title, &request.body);
        if let Some(existing) = self.suggestions.find_by_fingerprint(&fingerprint).await? {
            if matches!(
                existing.status,
                SuggestionStatus::Pending | SuggestionStatus::Saved
            ) {
                return Ok((existing, false));
            }
        }

        self.limiter.check(&request.agent_name)?;

        let now = Utc::now();
        let suggestion = Suggestion::new(&request.agent_name, &request.title, &request.body)
            .with_confidence(request.confidence.unwrap_or(0.5).clamp(0.0, 1.0))
            .with_source(SuggestionSource::Ingested)
            .with_tags(request.tags)
            .with_fingerprint(fingerprint)
            .with_available_at(now + chrono::Duration::milliseconds(self.settings.debounce.as_millis() as i64))
            .with_expires_at(now + chrono::Duration::seconds(self.settings.ttl.as_secs() as i64));
        self.suggestions.create(&suggestion).await?;
        info!(
            suggestion_id = %suggestion.id,
            agent = %suggestion.agent_name,
            "Suggestion ingested"
        );
        Ok((suggestion, true))
    }

    /// Fetches one suggestion.
    pub async fn get(&self, id: Uuid) -> ForemanResult<Suggestion> {
        self.suggestions
            .get(id)
            .await?
            .ok_or_else(|| ForemanError::not_found("suggestion", id))
    }

    /// Lists suggestions whose debounce horizon has passed, newest
    /// first, optionally filtered by agent and status.
    pub async fn list(
        &self,
        agent: Option<&str>,
        status: Option<SuggestionStatus>,
    ) -> ForemanResult<Vec<Suggestion>> {
        let now = Utc::now();
        Ok(self
            .suggestions
            .list()
            .await?
            .into_iter()
            .filter(|s| s.is_visible(now))
            .filter(|s| agent.map_or(true, |a| s.agent_name == a))
            .filter(|s| status.map_or(true, |st| s.status == st))
            .collect())
    }

    /// Clusters and ranks visible suggestions. Defaults to pending
    /// rows; `min_score` drops weak clusters.
    pub async fn summarize(
        &self,
        status: Option<SuggestionStatus>,
        min_score: f64,
    ) -> ForemanResult<Vec<SuggestionCluster>> {
        let rows = self
            .list(None, Some(status.unwrap_or(SuggestionStatus::Pending)))
            .await?;
        let now = Utc::now();
        let mut scored = Vec::with_capacity(rows.len());
        for suggestion in rows {
            let trust = self.directory.trust_weight(&suggestion.agent_name).await;
            let score = cluster::score(&suggestion, trust, now);
            scored.push(ScoredSuggestion { suggestion, score });
        }
        Ok(cluster::cluster(scored)
            .into_iter()
            .filter(|c| c.score >= min_score)
            .collect())
    }

    /// Accepts a pending suggestion into a real task and hands the task
    /// to the originating agent. Delegation is best-effort: the
    /// acceptance stands even when the hand-off fails.
    pub async fn accept(&self, id: Uuid) -> ForemanResult<(Suggestion, Task)> {
        let mut suggestion = self.get(id).await?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(ForemanError::Validation(format!(
                "suggestion {id} is {}, only pending can be accepted",
                suggestion.status
            )));
        }

        let mut task = Task::new(
            &suggestion.title,
            &suggestion.description,
            suggestion.priority,
        );
        task.insert_metadata("suggestion_id", serde_json::json!(suggestion.id));
        task.insert_metadata("suggested_by", serde_json::json!(suggestion.agent_name));
        if let Some(category) = &suggestion.category {
            task.insert_metadata("suggestion_category", serde_json::json!(category));
        }
        self.tasks.create(&task).await?;

        suggestion.status = SuggestionStatus::Accepted;
        suggestion.accepted_task_id = Some(task.id);
        self.suggestions.update(&suggestion).await?;
        info!(
            suggestion_id = %id,
            task_id = %task.id,
            agent = %suggestion.agent_name,
            "Suggestion accepted"
        );

        let options = DelegateOptions {
            agent_name: Some(suggestion.agent_name.clone()),
            ..DelegateOptions::default()
        };
        if let Err(e) = self.machine.delegate(task.id, options).await {
            warn!(task_id = %task.id, error = %e, "Accepted suggestion could not be delegated");
        }

        // Return the task as the store sees it after the hand-off.
        let refreshed = self.tasks.get(task.id).await?;
        Ok((suggestion, refreshed.unwrap_or(task)))
    }

    /// Rejects a pending suggestion, keeping the reason for audit.
    pub async fn reject(&self, id: Uuid, reason: Option<String>) -> ForemanResult<Suggestion> {
        let mut suggestion = self.get(id).await?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(ForemanError::Validation(format!(
                "suggestion {id} is {}, only pending can be rejected",
                suggestion.status
            )));
        }
        suggestion.status = SuggestionStatus::Rejected;
        if let Some(reason) = reason {
            suggestion
                .metadata
                .insert("rejection_reason".to_string(), serde_json::json!(reason));
        }
        self.suggestions.update(&suggestion).await?;
        info!(suggestion_id = %id, "Suggestion rejected");
        Ok(suggestion)
    }

    /// Sends a clarifying message to the suggesting agent. The agent's
    /// answer lands in the conversation thread and may amend the title
    /// or description. When the gateway fails or answers with nothing
    /// usable, a canned acknowledgement is appended and nothing is
    /// amended.
    pub async fn reply(&self, id: Uuid, text: &str) -> ForemanResult<Suggestion> {
        let mut suggestion = self.get(id).await?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(ForemanError::Validation(format!(
                "suggestion {id} is {}, only pending can be discussed",
                suggestion.status
            )));
        }
        suggestion.conversation.push(ConversationTurn::user(text));

        let request = GenerationRequest::new(reply_prompt(&suggestion))
            .with_system(REPLY_SYSTEM_PROMPT.to_string());
        match self.gateway.generate(&request).await {
            Ok(raw) => match extract::extract_json_object(&raw) {
                Some(object) => {
                    let reply = object
                        .get("reply")
                        .and_then(|v| v.as_str())
                        .unwrap_or(CANNED_REPLY);
                    suggestion.conversation.push(ConversationTurn::agent(reply));
                    if let Some(title) = object.get("title").and_then(|v| v.as_str()) {
                        suggestion.title = title.to_string();
                    }
                    if let Some(description) = object.get("description").and_then(|v| v.as_str()) {
                        suggestion.description = description.to_string();
                    }
                }
                None => {
                    warn!(suggestion_id = %id, "Agent reply carried no JSON object");
                    suggestion
                        .conversation
                        .push(ConversationTurn::agent(CANNED_REPLY));
                }
            },
            Err(e) => {
                warn!(suggestion_id = %id, error = %e, "Agent reply failed");
                suggestion
                    .conversation
                    .push(ConversationTurn::agent(CANNED_REPLY));
            }
        }

        self.suggestions.update(&suggestion).await?;
        Ok(suggestion)
    }

    /// Sweeps pending suggestions past their expiry to `expired`.
    /// Returns how many were swept.
    pub async fn expire_due(&self) -> ForemanResult<usize> {
        let now = Utc::now();
        let mut swept = 0;
        for mut suggestion in self.suggestions.list_pending().await? {
            if suggestion.is_expired(now) {
                suggestion.status = SuggestionStatus::Expired;
                self.suggestions.update(&suggestion).await?;
                swept += 1;
            }
        }
        if swept > 0 {
            info!(count = swept, "Expired stale suggestions");
        }
        Ok(swept)
    }
}

/// Hex SHA-256 over title, body, and agent name. Identical pushes map
/// to identical fingerprints regardless of timing.
pub(crate) fn content_fingerprint(agent_name: &str, title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(body.as_bytes());
    hasher.update(agent_name.as_bytes());
    hex::encode(hasher.finalize())
}

fn reply_prompt(suggestion: &Suggestion) -> String {
    let mut prompt = format!(
        "Suggestion under review:\nTitle: {}\nDescription: {}\n",
        suggestion.title, suggestion.description
    );
    if let Some(rationale) = &suggestion.rationale {
        prompt.push_str(&format!("Rationale: {rationale}\n"));
    }
    prompt.push_str("\nConversation so far:\n");
    for turn in &suggestion.conversation {
        let speaker = match turn.role {
            TurnRole::User => "Human",
            TurnRole::Agent => "Agent",
        };
        prompt.push_str(&format!("{speaker}: {}\n", turn.text));
    }
    prompt.push_str("\nAnswer the human's latest message.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let a = content_fingerprint("email-agent", "title", "body");
        let b = content_fingerprint("email-agent", "title", "body");
        let c = content_fingerprint("email-agent", "title", "different body");
        let d = content_fingerprint("coding-agent", "title", "body");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_reply_prompt_carries_thread() {
        let mut suggestion = Suggestion::new("email-agent", "Clean inbox", "Too many newsletters")
            .with_rationale("40 unread newsletters");
        suggestion
            .conversation
            .push(ConversationTurn::user("which ones first?"));
        let prompt = reply_prompt(&suggestion);
        assert!(prompt.contains("Title: Clean inbox"));
        assert!(prompt.contains("Rationale: 40 unread newsletters"));
        assert!(prompt.contains("Human: which ones first?"));
    }

    #[test]
    fn test_default_settings_match_documented_limits() {
        let settings = SuggestSettings::default();
        assert_eq!(settings.burst_limit, 5);
        assert_eq!(settings.burst_window, Duration::from_secs(10));
        assert_eq!(settings.minute_limit, 30);
        assert_eq!(settings.debounce, Duration::from_millis(5_000));
        assert_eq!(settings.cycle_interval, Duration::from_secs(300));
    }
}

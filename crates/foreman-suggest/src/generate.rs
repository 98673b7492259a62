//! Periodic suggestion generation with prerequisite gating.
//!
//! An agent missing its setup cannot suggest anything useful, so the
//! pipeline first checks prerequisites and, when they are unmet, asks
//! the human for the setup instead of asking the model for ideas.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::Utc;
use foreman_core::{
    AgentProfile, ForemanError, ForemanResult, Suggestion, SuggestionSource, Task, TaskPriority,
};
use foreman_llm::{extract, GenerationRequest};
use tracing::{debug, info, warn};

use crate::service::{content_fingerprint, Credentials, SuggestionService};

/// At most this many generated suggestions survive one pass.
const MAX_GENERATED: usize = 3;

/// How many recent tasks and delegations the context bundle carries.
const CONTEXT_ROWS: usize = 20;

const GENERATION_SYSTEM_PROMPT: &str = "\
You proactively suggest tasks the human has not asked for yet.

Rules:
1. Reply with a JSON array of at most 3 objects and nothing else.
2. Each object carries \"title\" and \"description\"; \"rationale\",
   \"priority\", \"category\", and \"tags\" are optional.
3. Priority is one of: low, medium, high, urgent.
4. Suggest only work within your own specialty.
5. Never repeat a task that already exists.";

impl SuggestionService {
    /// Runs one generation pass for an agent. Unmet prerequisites
    /// short-circuit into setup requests at full confidence; otherwise
    /// the agent is asked for up to three ideas, which are deduplicated
    /// against pending suggestions and persisted with a TTL.
    pub async fn generate_for_agent(&self, agent_name: &str) -> ForemanResult<Vec<Suggestion>> {
        let profile = self
            .directory
            .get(agent_name)
            .await
            .ok_or_else(|| ForemanError::not_found("agent", agent_name))?;
        if !profile.suggesting {
            debug!(agent = %agent_name, "Agent does not suggest; skipping");
            return Ok(Vec::new());
        }

        let mut recent_tasks = self.tasks.list().await?;
        recent_tasks.truncate(CONTEXT_ROWS);

        let pending_titles = self.pending_titles().await?;

        let prerequisites = prerequisite_suggestions(&profile, &recent_tasks, &self.credentials);
        if !prerequisites.is_empty() {
            let created = self.persist_new(prerequisites, &pending_titles).await?;
            info!(
                agent = %agent_name,
                count = created.len(),
                "Prerequisites unmet; raised setup requests"
            );
            return Ok(created);
        }

        let request = GenerationRequest::new(self.render_context(&profile, &recent_tasks).await?)
            .with_system(if profile.suggestion_prompt.is_empty() {
                GENERATION_SYSTEM_PROMPT.to_string()
            } else {
                profile.suggestion_prompt.clone()
            });
        let raw = match self.gateway.generate(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(agent = %agent_name, error = %e, "Suggestion generation failed");
                return Ok(Vec::new());
            }
        };

        let Some(items) = extract::extract_json_array(&raw) else {
            warn!(agent = %agent_name, "Model output carried no JSON array");
            return Ok(Vec::new());
        };
        let drafts: Vec<Suggestion> = items
            .iter()
            .take(MAX_GENERATED)
            .filter_map(|item| parse_generated(agent_name, item))
            .collect();

        let created = self.persist_new(drafts, &pending_titles).await?;
        info!(agent = %agent_name, count = created.len(), "Generated suggestions");
        Ok(created)
    }

    /// Persists drafts that do not collide with a pending (agent,
    /// title) pair, stamping fingerprint and expiry.
    async fn persist_new(
        &self,
        drafts: Vec<Suggestion>,
        pending_titles: &HashSet<(String, String)>,
    ) -> ForemanResult<Vec<Suggestion>> {
        let expires = Utc::now() + chrono::Duration::seconds(self.settings.ttl.as_secs() as i64);
        let mut created = Vec::new();
        for draft in drafts {
            let key = (draft.agent_name.clone(), draft.title.clone());
            if pending_titles.contains(&key) {
                debug!(agent = %draft.agent_name, title = %draft.title, "Already pending; skipped");
                continue;
            }
            let fingerprint =
                content_fingerprint(&draft.agent_name, &draft.title, &draft.description);
            let suggestion = draft.with_fingerprint(fingerprint).with_expires_at(expires);
            self.suggestions.create(&suggestion).await?;
            created.push(suggestion);
        }
        Ok(created)
    }

    async fn pending_titles(&self) -> ForemanResult<HashSet<(String, String)>> {
        Ok(self
            .suggestions
            .list_pending()
            .await?
            .into_iter()
            .map(|s| (s.agent_name, s.title))
            .collect())
    }

    /// Renders the context bundle the agent reasons over: recent tasks,
    /// the other agents, and recent delegation outcomes.
    async fn render_context(
        &self,
        profile: &AgentProfile,
        recent_tasks: &[Task],
    ) -> ForemanResult<String> {
        let mut prompt = String::from("Recent tasks:\n");
        if recent_tasks.is_empty() {
            prompt.push_str("- none\n");
        }
        for task in recent_tasks {
            prompt.push_str(&format!(
                "- [{}] {} ({})\n",
                task.status, task.title, task.priority
            ));
        }

        let others: Vec<String> = self
            .directory
            .names()
            .await
            .into_iter()
            .filter(|name| name != &profile.name)
            .collect();
        prompt.push_str(&format!("\nOther agents: {}\n", others.join(", ")));

        let recent = self.delegations.list_recent(CONTEXT_ROWS).await?;
        if !recent.is_empty() {
            prompt.push_str("\nRecent delegation outcomes:\n");
            for delegation in recent {
                prompt.push_str(&format!(
                    "- {} -> {}: {}\n",
                    delegation.input.title, delegation.agent_name, delegation.status
                ));
            }
        }

        prompt.push_str("\nWhat should the human do next in your specialty?");
        Ok(prompt)
    }
}

/// Builds the setup requests an agent needs before it can contribute.
/// An empty return means every prerequisite is met.
fn prerequisite_suggestions(
    profile: &AgentProfile,
    recent_tasks: &[Task],
    credentials: &Credentials,
) -> Vec<Suggestion> {
    let mut out = Vec::new();
    let setup = |title: &str, description: &str| {
        Suggestion::new(&profile.name, title, description)
            .with_confidence(1.0)
            .with_category("setup")
            .with_source(SuggestionSource::PrerequisiteCheck)
    };

    if recent_tasks.is_empty() {
        out.push(setup(
            "Add your first tasks",
            "There are no tasks yet, so I have nothing to learn your priorities from. \
Create a few tasks and I will start suggesting follow-ups.",
        ));
    }

    match profile.name.as_str() {
        "email-agent" => {
            if credentials.smtp_host.is_none() {
                out.push(setup(
                    "Connect your mail account",
                    "No mail server is configured. Set smtp_host in the credentials section \
so I can read and draft email.",
                ));
            }
        }
        "coding-agent" => {
            if credentials.codebase_index_dir.is_none() {
                out.push(setup(
                    "Point me at your codebase",
                    "No codebase index is configured. Set codebase_index_dir in the \
credentials section so my fixes reference real code.",
                ));
            }
        }
        "investment-agent" => {
            if credentials.market_data_api_key.is_none() {
                out.push(setup(
                    "Connect a market data feed",
                    "No market data key is configured. Set market_data_api_key in the \
credentials section so I can price your holdings.",
                ));
            }
            if !recent_tasks.is_empty() && !any_task_matches(recent_tasks, &profile.keywords) {
                out.push(setup(
                    "Tell me about your holdings",
                    "None of your tasks mention investments, so I have no picture of your \
portfolio. Add a task describing what you hold and what you aim for.",
                ));
            }
        }
        _ => {}
    }

    out
}

/// Whether any task's text contains any of the given keywords.
fn any_task_matches(tasks: &[Task], keywords: &[String]) -> bool {
    tasks.iter().any(|task| {
        let text = format!("{} {}", task.title, task.description).to_lowercase();
        keywords
            .iter()
            .any(|keyword| text.contains(keyword.to_lowercase().as_str()))
    })
}

/// Turns one model-emitted object into a draft suggestion. Items
/// without a usable title are dropped.
fn parse_generated(agent_name: &str, item: &serde_json::Value) -> Option<Suggestion> {
    let title = item.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }
    let description = item
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let mut suggestion = Suggestion::new(agent_name, title, description)
        .with_confidence(0.7)
        .with_source(SuggestionSource::Generated);
    if let Some(rationale) = item.get("rationale").and_then(|v| v.as_str()) {
        suggestion = suggestion.with_rationale(rationale);
    }
    if let Some(priority) = item
        .get("priority")
        .and_then(|v| v.as_str())
        .and_then(|s| TaskPriority::from_str(s).ok())
    {
        suggestion = suggestion.with_priority(priority);
    }
    if let Some(category) = item.get("category").and_then(|v| v.as_str()) {
        suggestion = suggestion.with_category(category);
    }
    if let Some(tags) = item.get("tags").and_then(|v| v.as_array()) {
        let tags: Vec<String> = tags
            .iter()
            .filter_map(|t| t.as_str())
            .map(str::to_string)
            .collect();
        suggestion = suggestion.with_tags(tags);
    }
    Some(suggestion)
}

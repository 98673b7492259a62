//! Resolves a task to an agent in three phases.
//!
//! Phase one scores every registered profile's keywords against the task
//! text and wins outright when the evidence is strong enough. Phase two
//! asks the model to pick a name from the registered set, bounded by a
//! hard timeout. Phase three hands the task to the generalist.

use std::sync::Arc;
use std::time::Duration;

use foreman_agent::{AgentDirectory, GENERAL_AGENT};
use foreman_core::AgentProfile;
use foreman_llm::{GenerationGateway, GenerationRequest};
use tracing::{debug, warn};

use crate::prompts;

/// Keyword evidence below this score never decides routing on its own.
const MIN_KEYWORD_SCORE: u32 = 2;

/// Confidence assigned when the model picks the agent.
const LLM_CONFIDENCE: f64 = 0.7;

/// Confidence assigned when routing falls through to the generalist.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// A routing decision: which agent, why, and how sure.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Classification {
    /// Name of the agent the task resolved to.
    pub agent_name: String,
    /// How the decision was reached, e.g. `keyword-match(4)`.
    pub intent: String,
    /// Routing confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl Classification {
    /// Decision for an operator-forced agent.
    pub fn manual(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            intent: "manual-assignment".to_string(),
            confidence: 1.0,
        }
    }

    fn fallback() -> Self {
        Self {
            agent_name: GENERAL_AGENT.to_string(),
            intent: "default-fallback".to_string(),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

/// Three-phase classifier over a live agent directory.
pub struct Classifier {
    gateway: Arc<dyn GenerationGateway>,
    llm_timeout: Duration,
}

impl Classifier {
    /// Creates a classifier that consults `gateway` in phase two,
    /// giving up on the model after `llm_timeout`.
    pub fn new(gateway: Arc<dyn GenerationGateway>, llm_timeout: Duration) -> Self {
        Self {
            gateway,
            llm_timeout,
        }
    }

    /// Resolves a task to an agent. Never fails: when neither keywords
    /// nor the model decide, the generalist takes the task at low
    /// confidence.
    pub async fn classify(
        &self,
        title: &str,
        description: &str,
        directory: &AgentDirectory,
    ) -> Classification {
        let profiles = directory.snapshot().await;

        if let Some(decision) = keyword_classification(title, description, &profiles) {
            debug!(
                agent = %decision.agent_name,
                confidence = decision.confidence,
                "classified by keywords"
            );
            return decision;
        }

        match tokio::time::timeout(
            self.llm_timeout,
            self.llm_classification(title, description, &profiles),
        )
        .await
        {
            Ok(Some(decision)) => {
                debug!(agent = %decision.agent_name, "classified by model");
                return decision;
            }
            Ok(None) => {
                debug!("model returned no usable agent name");
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.llm_timeout.as_secs(),
                    "classification model call timed out"
                );
            }
        }

        Classification::fallback()
    }

    async fn llm_classification(
        &self,
        title: &str,
        description: &str,
        profiles: &[AgentProfile],
    ) -> Option<Classification> {
        if profiles.is_empty() {
            return None;
        }
        let request = GenerationRequest::new(prompts::classification_prompt(
            title,
            description,
            profiles,
        ))
        .with_system(prompts::CLASSIFIER_SYSTEM_PROMPT.to_string());

        let reply = match self.gateway.generate(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "classification model call failed");
                return None;
            }
        };

        let normalized = normalize_agent_name(&reply);
        profiles
            .iter()
            .find(|p| normalized == p.name || normalized.contains(p.name.as_str()))
            .map(|p| Classification {
                agent_name: p.name.clone(),
                intent: "llm-classified".to_string(),
                confidence: LLM_CONFIDENCE,
            })
    }
}

/// Scores every profile's keywords against the task text. Single-word
/// keywords count 1, multi-word phrases count 2. The best profile wins
/// only when its score reaches [`MIN_KEYWORD_SCORE`]; ties resolve to
/// the first profile in name order.
fn keyword_classification(
    title: &str,
    description: &str,
    profiles: &[AgentProfile],
) -> Option<Classification> {
    let text = format!("{title} {description}").to_lowercase();
    let total_keywords: usize = profiles.iter().map(|p| p.keywords.len()).sum();
    if total_keywords == 0 {
        return None;
    }

    let mut best: Option<(&AgentProfile, u32)> = None;
    for profile in profiles {
        let mut score = 0u32;
        for keyword in &profile.keywords {
            if text.contains(keyword.to_lowercase().as_str()) {
                score += if keyword.contains(' ') { 2 } else { 1 };
            }
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((profile, score));
        }
    }

    let (profile, score) = best?;
    if score < MIN_KEYWORD_SCORE {
        return None;
    }

    let ratio = f64::from(score) / total_keywords as f64;
    let confidence = round2(f64::min(0.95, 0.5 + ratio * 5.0));
    Some(Classification {
        agent_name: profile.name.clone(),
        intent: format!("keyword-match({score})"),
        confidence,
    })
}

/// Lowercases a model reply and strips everything outside `[a-z-]` so
/// answers like `"Coding-Agent."` still match a registered name.
fn normalize_agent_name(reply: &str) -> String {
    reply
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == '-')
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

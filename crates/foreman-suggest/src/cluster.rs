//! Near-duplicate grouping and ranking for suggestion listings.
//!
//! Humans triage a summary, not a raw feed. Suggestions whose text
//! overlaps enough (or whose tags intersect) collapse into one cluster
//! represented by its strongest member; clusters rank by the mean score
//! of their members.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use foreman_core::Suggestion;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token-set similarity at or above this joins an existing cluster.
const JACCARD_THRESHOLD: f64 = 0.5;

/// A suggestion with its computed triage score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSuggestion {
    /// The underlying suggestion.
    pub suggestion: Suggestion,
    /// Score in `[0, 1]`: confidence, agent trust, and recency.
    pub score: f64,
}

/// A group of near-duplicate suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionCluster {
    /// The strongest member, shown in summaries.
    pub representative: Suggestion,
    /// Ids of every member, strongest first.
    pub member_ids: Vec<Uuid>,
    /// Mean member score.
    pub score: f64,
    /// Member count.
    pub size: usize,
}

/// Lowercases, strips non-alphanumeric characters, and keeps tokens
/// longer than one character.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 1)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets. Empty-against-empty is zero.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// Recency multiplier: fresh suggestions keep full weight, older ones
/// decay toward a floor of 0.5 so age alone never buries them.
pub fn recency_factor(age_minutes: f64) -> f64 {
    f64::max(0.5, (-age_minutes / 60.0).exp())
}

/// Triage score for one suggestion.
pub fn score(suggestion: &Suggestion, trust_weight: f64, now: DateTime<Utc>) -> f64 {
    let age_minutes = (now - suggestion.created_at).num_seconds() as f64 / 60.0;
    let raw = suggestion.confidence * trust_weight * recency_factor(age_minutes.max(0.0));
    raw.clamp(0.0, 1.0)
}

/// Groups scored suggestions into clusters. Each suggestion joins the
/// first cluster whose seed text is similar enough or whose seed tags
/// intersect its own, otherwise it opens a new cluster. Clusters come
/// back sorted by score, strongest first.
pub fn cluster(mut scored: Vec<ScoredSuggestion>) -> Vec<SuggestionCluster> {
    struct Bucket {
        seed_tokens: HashSet<String>,
        seed_tags: HashSet<String>,
        members: Vec<ScoredSuggestion>,
    }

    let mut buckets: Vec<Bucket> = Vec::new();
    for item in scored.drain(..) {
        let tokens = tokenize(&format!(
            "{} {}",
            item.suggestion.title, item.suggestion.description
        ));
        let tags: HashSet<String> = item.suggestion.tags.iter().cloned().collect();

        let slot = buckets.iter_mut().find(|bucket| {
            jaccard(&bucket.seed_tokens, &tokens) >= JACCARD_THRESHOLD
                || (!tags.is_empty() && bucket.seed_tags.intersection(&tags).next().is_some())
        });
        match slot {
            Some(bucket) => bucket.members.push(item),
            None => buckets.push(Bucket {
                seed_tokens: tokens,
                seed_tags: tags,
                members: vec![item],
            }),
        }
    }

    let mut clusters: Vec<SuggestionCluster> = buckets
        .into_iter()
        .map(|mut bucket| {
            bucket
                .members
                .sort_by(|a, b| b.score.total_cmp(&a.score));
            let size = bucket.members.len();
            let mean = bucket.members.iter().map(|m| m.score).sum::<f64>() / size as f64;
            let member_ids = bucket.members.iter().map(|m| m.suggestion.id).collect();
            SuggestionCluster {
                representative: bucket.members.swap_remove(0).suggestion,
                member_ids,
                score: mean,
                size,
            }
        })
        .collect();
    clusters.sort_by(|a, b| b.score.total_cmp(&a.score));
    clusters
}

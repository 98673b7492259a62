use crate::catalog::{builtin_profile, builtin_profiles, placeholder_profile};
use foreman_core::{AgentProfile, ForemanResult};
use foreman_store::AgentStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Thread-safe registry of agent profiles, persisted through an
/// [`AgentStore`].
///
/// Snapshots are sorted by name so every consumer (classifier, suggestion
/// cycle) sees agents in a deterministic order.
#[derive(Clone)]
pub struct AgentDirectory {
    agents: Arc<RwLock<HashMap<String, AgentProfile>>>,
    store: Arc<dyn AgentStore>,
}

impl AgentDirectory {
    /// Creates an empty directory over the given store.
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    /// Seeds the directory: built-in catalog first, then persisted profiles
    /// on top (a stored profile wins over the built-in of the same name).
    /// Built-ins that were never stored are persisted now.
    pub async fn bootstrap(&self) -> ForemanResult<()> {
        let stored = self.store.list().await?;
        let mut agents = self.agents.write().await;
        for profile in builtin_profiles() {
            agents.insert(profile.name.clone(), profile);
        }
        for profile in stored {
            agents.insert(profile.name.clone(), profile);
        }
        for profile in agents.values() {
            if self.store.get(&profile.name).await?.is_none() {
                self.store.upsert(profile).await?;
            }
        }
        info!(agents = agents.len(), "agent directory bootstrapped");
        Ok(())
    }

    /// Fetches a profile by name.
    pub async fn get(&self, name: &str) -> Option<AgentProfile> {
        self.agents.read().await.get(name).cloned()
    }

    /// Whether the directory knows the given agent.
    pub async fn contains(&self, name: &str) -> bool {
        self.agents.read().await.contains_key(name)
    }

    /// Registers (or replaces) a profile and persists it.
    pub async fn register(&self, profile: AgentProfile) -> ForemanResult<()> {
        self.store.upsert(&profile).await?;
        info!(agent = %profile.name, auto = profile.auto_registered, "agent registered");
        self.agents
            .write()
            .await
            .insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Registers an unknown agent on first reference.
    ///
    /// Uses the built-in catalog profile when the name matches one,
    /// otherwise a minimal placeholder. Returns the registered profile.
    pub async fn auto_register(&self, name: &str) -> ForemanResult<AgentProfile> {
        let profile = match builtin_profile(name) {
            Some(profile) => profile.auto_registered(),
            None => placeholder_profile(name),
        };
        self.register(profile.clone()).await?;
        Ok(profile)
    }

    /// All profiles, sorted by name.
    pub async fn snapshot(&self) -> Vec<AgentProfile> {
        let mut all: Vec<AgentProfile> = self.agents.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// All agent names, sorted.
    pub async fn names(&self) -> Vec<String> {
        self.snapshot().await.into_iter().map(|p| p.name).collect()
    }

    /// Names of agents included in the suggestion cycle, sorted.
    pub async fn suggesting_agents(&self) -> Vec<String> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|p| p.suggesting)
            .map(|p| p.name)
            .collect()
    }

    /// Suggestion trust weight for an agent; unknown agents weigh 1.0.
    pub async fn trust_weight(&self, name: &str) -> f64 {
        self.agents
            .read()
            .await
            .get(name)
            .map_or(1.0, |p| p.trust_weight)
    }
}

use crate::traits::{AgentStore, DelegationStore, SuggestionStore, TaskStore, WorkflowRunStore};
use async_trait::async_trait;
use foreman_core::{
    AgentProfile, Delegation, ForemanError, ForemanResult, Suggestion, Task, WorkflowRun,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory backend over tokio `RwLock` maps.
///
/// Used by tests and by ephemeral runs (`db_path = ":memory:"` is handled by
/// the SQLite backend; this one never touches disk at all).
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    delegations: RwLock<HashMap<Uuid, Delegation>>,
    suggestions: RwLock<HashMap<Uuid, Suggestion>>,
    runs: RwLock<Vec<WorkflowRun>>,
    agents: RwLock<HashMap<String, AgentProfile>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: &Task) -> ForemanResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(ForemanError::Store(format!(
                "task {} already exists",
                task.id
            )));
        }
        if let Some(key) = &task.run_key {
            if tasks.values().any(|t| t.run_key.as_deref() == Some(key)) {
                return Err(ForemanError::Store(format!(
                    "run key {key} already exists"
                )));
            }
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ForemanResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> ForemanResult<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&task.id) {
            return Err(ForemanError::not_found("task", task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn list(&self) -> ForemanResult<Vec<Task>> {
        let mut all: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn find_by_run_key(&self, run_key: &str) -> ForemanResult<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .find(|t| t.run_key.as_deref() == Some(run_key))
            .cloned())
    }
}

#[async_trait]
impl DelegationStore for MemoryStore {
    async fn create(&self, delegation: &Delegation) -> ForemanResult<()> {
        self.delegations
            .write()
            .await
            .insert(delegation.id, delegation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ForemanResult<Option<Delegation>> {
        Ok(self.delegations.read().await.get(&id).cloned())
    }

    async fn update(&self, delegation: &Delegation) -> ForemanResult<()> {
        let mut delegations = self.delegations.write().await;
        if !delegations.contains_key(&delegation.id) {
            return Err(ForemanError::not_found("delegation", delegation.id));
        }
        delegations.insert(delegation.id, delegation.clone());
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> ForemanResult<Vec<Delegation>> {
        let mut all: Vec<Delegation> = self
            .delegations
            .read()
            .await
            .values()
            .filter(|d| d.task_id == task_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_recent(&self, limit: usize) -> ForemanResult<Vec<Delegation>> {
        let mut all: Vec<Delegation> = self.delegations.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}

#[async_trait]
impl SuggestionStore for MemoryStore {
    async fn create(&self, suggestion: &Suggestion) -> ForemanResult<()> {
        self.suggestions
            .write()
            .await
            .insert(suggestion.id, suggestion.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ForemanResult<Option<Suggestion>> {
        Ok(self.suggestions.read().await.get(&id).cloned())
    }

    async fn update(&self, suggestion: &Suggestion) -> ForemanResult<()> {
        let mut suggestions = self.suggestions.write().await;
        if !suggestions.contains_key(&suggestion.id) {
            return Err(ForemanError::not_found("suggestion", suggestion.id));
        }
        suggestions.insert(suggestion.id, suggestion.clone());
        Ok(())
    }

    async fn list(&self) -> ForemanResult<Vec<Suggestion>> {
        let mut all: Vec<Suggestion> = self.suggestions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_pending(&self) -> ForemanResult<Vec<Suggestion>> {
        let mut all: Vec<Suggestion> = self
            .suggestions
            .read()
            .await
            .values()
            .filter(|s| s.status == foreman_core::SuggestionStatus::Pending)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> ForemanResult<Option<Suggestion>> {
        Ok(self
            .suggestions
            .read()
            .await
            .values()
            .filter(|s| s.fingerprint == fingerprint)
            .max_by_key(|s| s.created_at)
            .cloned())
    }
}

#[async_trait]
impl WorkflowRunStore for MemoryStore {
    async fn record(&self, run: &WorkflowRun) -> ForemanResult<()> {
        self.runs.write().await.push(run.clone());
        Ok(())
    }

    async fn list(&self) -> ForemanResult<Vec<WorkflowRun>> {
        let mut all = self.runs.read().await.clone();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(all)
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn upsert(&self, profile: &AgentProfile) -> ForemanResult<()> {
        self.agents
            .write()
            .await
            .insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> ForemanResult<Option<AgentProfile>> {
        Ok(self.agents.read().await.get(name).cloned())
    }

    async fn list(&self) -> ForemanResult<Vec<AgentProfile>> {
        let mut all: Vec<AgentProfile> = self.agents.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use foreman_core::{SuggestionStatus, TaskPriority};

    #[tokio::test]
    async fn test_task_roundtrip() {
        let store = MemoryStore::new();
        let task = Task::new("t", "d", TaskPriority::Medium);
        TaskStore::create(&store, &task).await.unwrap();
        let loaded = TaskStore::get(&store, task.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "t");
        assert!(TaskStore::get(&store, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_run_key_rejected() {
        let store = MemoryStore::new();
        let a = Task::new("a", "d", TaskPriority::Low).with_run_key("w:s:2026-01-01");
        let b = Task::new("b", "d", TaskPriority::Low).with_run_key("w:s:2026-01-01");
        TaskStore::create(&store, &a).await.unwrap();
        assert!(TaskStore::create(&store, &b).await.is_err());
    }

    #[tokio::test]
    async fn test_delegations_listed_newest_first() {
        let store = MemoryStore::new();
        let task = Task::new("t", "d", TaskPriority::Medium);
        for i in 0..3 {
            let mut d = Delegation::new(task.id, "a", "manual-assignment", 1.0, (&task).into());
            d.created_at += chrono::Duration::seconds(i);
            DelegationStore::create(&store, &d).await.unwrap();
        }
        let listed = store.list_for_task(task.id).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed[0].created_at > listed[2].created_at);
    }

    #[tokio::test]
    async fn test_fingerprint_lookup() {
        let store = MemoryStore::new();
        let s = Suggestion::new("a", "t", "d").with_fingerprint("abc");
        SuggestionStore::create(&store, &s).await.unwrap();
        let found = store.find_by_fingerprint("abc").await.unwrap().unwrap();
        assert_eq!(found.id, s.id);
        assert!(store.find_by_fingerprint("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_pending_excludes_triaged() {
        let store = MemoryStore::new();
        let pending = Suggestion::new("a", "p", "d").with_fingerprint("f1");
        let mut rejected = Suggestion::new("a", "r", "d").with_fingerprint("f2");
        rejected.status = SuggestionStatus::Rejected;
        SuggestionStore::create(&store, &pending).await.unwrap();
        SuggestionStore::create(&store, &rejected).await.unwrap();
        let listed = store.list_pending().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, pending.id);
    }

    #[tokio::test]
    async fn test_agent_list_sorted_by_name() {
        let store = MemoryStore::new();
        store
            .upsert(&AgentProfile::new("zeta-agent", ""))
            .await
            .unwrap();
        store
            .upsert(&AgentProfile::new("alpha-agent", ""))
            .await
            .unwrap();
        let listed = AgentStore::list(&store).await.unwrap();
        assert_eq!(listed[0].name, "alpha-agent");
        assert_eq!(listed[1].name, "zeta-agent");
    }
}

use crate::traits::{AgentStore, DelegationStore, SuggestionStore, TaskStore, WorkflowRunStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use foreman_core::{
    AgentProfile, Delegation, ForemanError, ForemanResult, Suggestion, Task, WorkflowRun,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

/// SQLite backend. One connection behind a tokio mutex.
///
/// Queryable columns (status, agent, fingerprint, run key) are relational;
/// the full entity rides along as a JSON body so the schema never chases
/// field additions.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn store_err(e: rusqlite::Error) -> ForemanError {
    ForemanError::Store(e.to_string())
}

/// Fixed-width UTC timestamp so lexicographic ORDER BY matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn migrate(conn: &Connection) -> ForemanResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS tasks (
          id TEXT PRIMARY KEY,
          status TEXT NOT NULL,
          run_key TEXT UNIQUE,
          created_at TEXT NOT NULL,
          body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

        CREATE TABLE IF NOT EXISTS delegations (
          id TEXT PRIMARY KEY,
          task_id TEXT NOT NULL,
          status TEXT NOT NULL,
          created_at TEXT NOT NULL,
          body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_delegations_task ON delegations(task_id, created_at);

        CREATE TABLE IF NOT EXISTS suggestions (
          id TEXT PRIMARY KEY,
          agent_name TEXT NOT NULL,
          status TEXT NOT NULL,
          fingerprint TEXT NOT NULL,
          created_at TEXT NOT NULL,
          body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_suggestions_fingerprint ON suggestions(fingerprint);
        CREATE INDEX IF NOT EXISTS idx_suggestions_agent_status ON suggestions(agent_name, status);

        CREATE TABLE IF NOT EXISTS workflow_runs (
          id TEXT PRIMARY KEY,
          workflow_name TEXT NOT NULL,
          started_at TEXT NOT NULL,
          body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_workflow ON workflow_runs(workflow_name);

        CREATE TABLE IF NOT EXISTS agents (
          name TEXT PRIMARY KEY,
          body TEXT NOT NULL
        );
        "#,
    )
    .map_err(store_err)
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    ///
    /// `":memory:"` opens an ephemeral database.
    pub fn open(path: &str) -> ForemanResult<Self> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let conn = Connection::open(path).map_err(store_err)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an ephemeral in-memory database.
    pub fn open_in_memory() -> ForemanResult<Self> {
        Self::open(":memory:")
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create(&self, task: &Task) -> ForemanResult<()> {
        let body = serde_json::to_string(task)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tasks (id, status, run_key, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.id.to_string(),
                task.status.to_string(),
                task.run_key,
                ts(task.created_at),
                body
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ForemanResult<Option<Task>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM tasks WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, task: &Task) -> ForemanResult<()> {
        let body = serde_json::to_string(task)?;
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(
                "UPDATE tasks SET status = ?2, run_key = ?3, body = ?4 WHERE id = ?1",
                params![
                    task.id.to_string(),
                    task.status.to_string(),
                    task.run_key,
                    body
                ],
            )
            .map_err(store_err)?;
        if affected == 0 {
            return Err(ForemanError::not_found("task", task.id));
        }
        Ok(())
    }

    async fn list(&self) -> ForemanResult<Vec<Task>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT body FROM tasks ORDER BY created_at DESC")
            .map_err(store_err)?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_err)?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ForemanError::from))
            .collect()
    }

    async fn find_by_run_key(&self, run_key: &str) -> ForemanResult<Option<Task>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM tasks WHERE run_key = ?1",
                params![run_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DelegationStore for SqliteStore {
    async fn create(&self, delegation: &Delegation) -> ForemanResult<()> {
        let body = serde_json::to_string(delegation)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO delegations (id, task_id, status, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                delegation.id.to_string(),
                delegation.task_id.to_string(),
                delegation.status.to_string(),
                ts(delegation.created_at),
                body
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ForemanResult<Option<Delegation>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM delegations WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, delegation: &Delegation) -> ForemanResult<()> {
        let body = serde_json::to_string(delegation)?;
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(
                "UPDATE delegations SET status = ?2, body = ?3 WHERE id = ?1",
                params![
                    delegation.id.to_string(),
                    delegation.status.to_string(),
                    body
                ],
            )
            .map_err(store_err)?;
        if affected == 0 {
            return Err(ForemanError::not_found("delegation", delegation.id));
        }
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> ForemanResult<Vec<Delegation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT body FROM delegations WHERE task_id = ?1 ORDER BY created_at DESC")
            .map_err(store_err)?;
        let bodies = stmt
            .query_map(params![task_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_err)?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ForemanError::from))
            .collect()
    }

    async fn list_recent(&self, limit: usize) -> ForemanResult<Vec<Delegation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT body FROM delegations ORDER BY created_at DESC LIMIT ?1")
            .map_err(store_err)?;
        let bodies = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_err)?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ForemanError::from))
            .collect()
    }
}

#[async_trait]
impl SuggestionStore for SqliteStore {
    async fn create(&self, suggestion: &Suggestion) -> ForemanResult<()> {
        let body = serde_json::to_string(suggestion)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO suggestions (id, agent_name, status, fingerprint, created_at, body) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                suggestion.id.to_string(),
                suggestion.agent_name,
                suggestion.status.to_string(),
                suggestion.fingerprint,
                ts(suggestion.created_at),
                body
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ForemanResult<Option<Suggestion>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM suggestions WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, suggestion: &Suggestion) -> ForemanResult<()> {
        let body = serde_json::to_string(suggestion)?;
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(
                "UPDATE suggestions SET status = ?2, body = ?3 WHERE id = ?1",
                params![
                    suggestion.id.to_string(),
                    suggestion.status.to_string(),
                    body
                ],
            )
            .map_err(store_err)?;
        if affected == 0 {
            return Err(ForemanError::not_found("suggestion", suggestion.id));
        }
        Ok(())
    }

    async fn list(&self) -> ForemanResult<Vec<Suggestion>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT body FROM suggestions ORDER BY created_at DESC")
            .map_err(store_err)?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_err)?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ForemanError::from))
            .collect()
    }

    async fn list_pending(&self) -> ForemanResult<Vec<Suggestion>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT body FROM suggestions WHERE status = 'pending' ORDER BY created_at DESC",
            )
            .map_err(store_err)?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_err)?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ForemanError::from))
            .collect()
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> ForemanResult<Option<Suggestion>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM suggestions WHERE fingerprint = ?1 \
                 ORDER BY created_at DESC LIMIT 1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WorkflowRunStore for SqliteStore {
    async fn record(&self, run: &WorkflowRun) -> ForemanResult<()> {
        let body = serde_json::to_string(run)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO workflow_runs (id, workflow_name, started_at, body) VALUES (?1, ?2, ?3, ?4)",
            params![
                run.id.to_string(),
                run.workflow_name,
                ts(run.started_at),
                body
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn list(&self) -> ForemanResult<Vec<WorkflowRun>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT body FROM workflow_runs ORDER BY started_at DESC")
            .map_err(store_err)?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_err)?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ForemanError::from))
            .collect()
    }
}

#[async_trait]
impl AgentStore for SqliteStore {
    async fn upsert(&self, profile: &AgentProfile) -> ForemanResult<()> {
        let body = serde_json::to_string(profile)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO agents (name, body) VALUES (?1, ?2) \
             ON CONFLICT(name) DO UPDATE SET body = excluded.body",
            params![profile.name, body],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, name: &str) -> ForemanResult<Option<AgentProfile>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM agents WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> ForemanResult<Vec<AgentProfile>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT body FROM agents ORDER BY name")
            .map_err(store_err)?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_err)?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ForemanError::from))
            .collect()
    }
}

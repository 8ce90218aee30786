use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use taskpilot_common::{Error, Priority, Result, TaskId, UserId};
use tracing::info;

use crate::parse_timestamp;

const MAX_TITLE_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 1000;

/// Persisted task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for new tasks before persistence assigns id/timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// Partial update; only `Some` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    All,
    Active,
}

/// Persistent storage for tasks, scoped to an owning user on every path.
pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening task store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    completed INTEGER NOT NULL DEFAULT 0,
                    priority TEXT NOT NULL DEFAULT 'medium',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_user
                    ON tasks(user_id, completed);",
            )
            .map_err(|e| Error::Database(format!("task migration failed: {e}")))?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn validate(title: &str, description: Option<&str>) -> Result<()> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_TITLE_LEN {
            return Err(Error::Validation(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        if let Some(desc) = description {
            if desc.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(Error::Validation(format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    /// Insert a new task for `user_id` and return the stored row.
    pub fn create(&self, user_id: &UserId, new_task: NewTask) -> Result<Task> {
        Self::validate(&new_task.title, new_task.description.as_deref())?;

        let task = Task {
            id: TaskId::new(),
            user_id: user_id.clone(),
            title: new_task.title.trim().to_string(),
            description: new_task.description,
            completed: false,
            priority: new_task.priority,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO tasks (id, user_id, title, description, completed, priority, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)",
                params![
                    task.id.as_str(),
                    task.user_id.as_str(),
                    task.title,
                    task.description,
                    task.priority.as_str(),
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to insert task: {e}")))?;

        Ok(task)
    }

    /// List tasks for a user in insertion order.
    pub fn list(&self, user_id: &UserId, filter: TaskFilter) -> Result<Vec<Task>> {
        let sql = match filter {
            TaskFilter::All => {
                "SELECT id, user_id, title, description, completed, priority, created_at, updated_at
                 FROM tasks WHERE user_id = ?1 ORDER BY rowid ASC"
            }
            TaskFilter::Active => {
                "SELECT id, user_id, title, description, completed, priority, created_at, updated_at
                 FROM tasks WHERE user_id = ?1 AND completed = 0 ORDER BY rowid ASC"
            }
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare task query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id.as_str()], row_to_task)
            .map_err(|e| Error::Database(format!("failed to list tasks: {e}")))?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(|e| Error::Database(format!("failed to read task row: {e}")))?);
        }
        Ok(tasks)
    }

    /// Exact-id lookup, scoped to the owner.
    pub fn find_by_id(&self, user_id: &UserId, task_id: &TaskId) -> Result<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, title, description, completed, priority, created_at, updated_at
                 FROM tasks WHERE id = ?1 AND user_id = ?2",
            )
            .map_err(|e| Error::Database(format!("failed to prepare task query: {e}")))?;

        let mut rows = stmt
            .query_map(params![task_id.as_str(), user_id.as_str()], row_to_task)
            .map_err(|e| Error::Database(format!("failed to find task: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| {
                Error::Database(format!("failed to read task row: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Case-insensitive substring title lookup. When several tasks match,
    /// the most recently created one wins.
    pub fn find_by_title(&self, user_id: &UserId, needle: &str) -> Result<Option<Task>> {
        if needle.trim().is_empty() {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, title, description, completed, priority, created_at, updated_at
                 FROM tasks
                 WHERE user_id = ?1 AND lower(title) LIKE '%' || lower(?2) || '%'
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
            )
            .map_err(|e| Error::Database(format!("failed to prepare title query: {e}")))?;

        let mut rows = stmt
            .query_map(params![user_id.as_str(), needle.trim()], row_to_task)
            .map_err(|e| Error::Database(format!("failed to find task by title: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| {
                Error::Database(format!("failed to read task row: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Resolve a task by id first, falling back to title-substring match.
    pub fn find(
        &self,
        user_id: &UserId,
        task_id: Option<&TaskId>,
        task_title: Option<&str>,
    ) -> Result<Option<Task>> {
        if let Some(id) = task_id {
            if let Some(task) = self.find_by_id(user_id, id)? {
                return Ok(Some(task));
            }
        }
        if let Some(title) = task_title {
            return self.find_by_title(user_id, title);
        }
        Ok(None)
    }

    /// Apply the `Some` fields of `update` and return the refreshed row,
    /// or `None` when the task does not exist for this user.
    pub fn update(
        &self,
        user_id: &UserId,
        task_id: &TaskId,
        update: TaskUpdate,
    ) -> Result<Option<Task>> {
        let Some(current) = self.find_by_id(user_id, task_id)? else {
            return Ok(None);
        };

        let title = update.title.unwrap_or(current.title);
        let description = update.description.or(current.description);
        let priority = update.priority.unwrap_or(current.priority);
        let completed = update.completed.unwrap_or(current.completed);
        Self::validate(&title, description.as_deref())?;

        self.conn
            .execute(
                "UPDATE tasks
                 SET title = ?1, description = ?2, priority = ?3, completed = ?4, updated_at = ?5
                 WHERE id = ?6 AND user_id = ?7",
                params![
                    title.trim(),
                    description,
                    priority.as_str(),
                    completed as i64,
                    Utc::now().to_rfc3339(),
                    task_id.as_str(),
                    user_id.as_str(),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to update task: {e}")))?;

        self.find_by_id(user_id, task_id)
    }

    /// Delete one task. Returns true when a row was removed.
    pub fn delete(&self, user_id: &UserId, task_id: &TaskId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id.as_str(), user_id.as_str()],
            )
            .map_err(|e| Error::Database(format!("failed to delete task: {e}")))?;
        Ok(rows > 0)
    }

    /// Delete every task owned by `user_id`. Returns the number removed.
    pub fn delete_all(&self, user_id: &UserId) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM tasks WHERE user_id = ?1",
                params![user_id.as_str()],
            )
            .map_err(|e| Error::Database(format!("failed to delete tasks: {e}")))?;
        Ok(rows)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let priority_raw: String = row.get(5)?;
    let created_raw: String = row.get(6)?;
    let updated_raw: String = row.get(7)?;
    Ok(Task {
        id: TaskId::from(id),
        user_id: UserId::from(user_id),
        title: row.get(2)?,
        description: row.get(3)?,
        completed: row.get::<_, i64>(4)? != 0,
        priority: priority_raw.parse().unwrap_or_default(),
        created_at: parse_timestamp(&created_raw),
        updated_at: parse_timestamp(&updated_raw),
    })
}

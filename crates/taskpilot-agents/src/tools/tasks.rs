use serde_json::json;
use std::sync::Arc;
use taskpilot_common::{Priority, Result, TaskId};
use taskpilot_db::{NewTask, Task, TaskFilter, TaskStore, TaskUpdate};
use tokio::sync::Mutex;

use async_trait::async_trait;

use crate::tools::{Tool, ToolContext, ToolOutput};

const PRIORITY_SCHEMA: &[&str] = &["low", "medium", "high", "urgent"];

fn lookup_args(args: &serde_json::Value) -> (Option<TaskId>, Option<&str>) {
    let task_id = args["task_id"].as_str().map(TaskId::from);
    let task_title = args["task_title"].as_str();
    (task_id, task_title)
}

async fn find_task(
    store: &Arc<Mutex<TaskStore>>,
    context: &ToolContext,
    args: &serde_json::Value,
) -> Result<Option<Task>> {
    let (task_id, task_title) = lookup_args(args);
    let store = store.lock().await;
    store.find(&context.user_id, task_id.as_ref(), task_title)
}

// ---------------------------------------------------------------------------
// AddTask
// ---------------------------------------------------------------------------

/// Tool for creating a new task for the calling user.
pub struct AddTask {
    store: Arc<Mutex<TaskStore>>,
}

impl AddTask {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddTask {
    fn name(&self) -> &'static str {
        "add_task"
    }

    fn description(&self) -> &'static str {
        "Add a new task for the user."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "The title of the task"},
                "description": {"type": "string", "description": "Optional description"},
                "priority": {"type": "string", "enum": PRIORITY_SCHEMA}
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        // Title validation happens at the storage boundary; a missing title
        // becomes an empty string and is rejected there.
        let title = args["title"].as_str().unwrap_or_default().to_string();
        let description = args["description"].as_str().map(|s| s.to_string());
        let priority: Priority = args["priority"]
            .as_str()
            .unwrap_or_default()
            .parse()
            .unwrap_or_default();

        let store = self.store.lock().await;
        let task = store.create(
            &context.user_id,
            NewTask {
                title,
                description,
                priority,
            },
        )?;

        Ok(ToolOutput::success(format!("Task '{}' added.", task.title)))
    }
}

// ---------------------------------------------------------------------------
// ListTasks / ListAllTasks
// ---------------------------------------------------------------------------

/// Tool listing the user's active (incomplete) tasks.
pub struct ListTasks {
    store: Arc<Mutex<TaskStore>>,
}

impl ListTasks {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListTasks {
    fn name(&self) -> &'static str {
        "list_tasks"
    }

    fn description(&self) -> &'static str {
        "List active (remaining) tasks for the user."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, context: &ToolContext, _args: serde_json::Value) -> Result<ToolOutput> {
        let store = self.store.lock().await;
        let tasks = store.list(&context.user_id, TaskFilter::Active)?;
        if tasks.is_empty() {
            return Ok(ToolOutput::success("No active tasks."));
        }

        let entries: Vec<String> = tasks
            .iter()
            .map(|t| format!("- {} (Priority: {})", t.title, t.priority))
            .collect();
        Ok(ToolOutput::success(format!(
            "Remaining tasks:\n{}",
            entries.join("\n")
        )))
    }
}

/// Tool listing every task, completed ones marked done.
pub struct ListAllTasks {
    store: Arc<Mutex<TaskStore>>,
}

impl ListAllTasks {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListAllTasks {
    fn name(&self) -> &'static str {
        "list_all_tasks"
    }

    fn description(&self) -> &'static str {
        "List ALL tasks (including completed ones) for the user."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, context: &ToolContext, _args: serde_json::Value) -> Result<ToolOutput> {
        let store = self.store.lock().await;
        let tasks = store.list(&context.user_id, TaskFilter::All)?;
        if tasks.is_empty() {
            return Ok(ToolOutput::success("No tasks found."));
        }

        let entries: Vec<String> = tasks
            .iter()
            .map(|t| {
                let marker = if t.completed { "[DONE] " } else { "" };
                format!("- {marker}{}", t.title)
            })
            .collect();
        Ok(ToolOutput::success(format!(
            "All tasks:\n{}",
            entries.join("\n")
        )))
    }
}

// ---------------------------------------------------------------------------
// CompleteTask
// ---------------------------------------------------------------------------

/// Tool marking a task as completed, looked up by id or title.
pub struct CompleteTask {
    store: Arc<Mutex<TaskStore>>,
}

impl CompleteTask {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CompleteTask {
    fn name(&self) -> &'static str {
        "complete_task"
    }

    fn description(&self) -> &'static str {
        "Mark a task as completed. You can provide task_id OR task_title."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "task_title": {"type": "string", "description": "The title of the task to complete"}
            }
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let Some(task) = find_task(&self.store, context, &args).await? else {
            return Ok(ToolOutput::success("Task not found."));
        };

        let store = self.store.lock().await;
        store.update(
            &context.user_id,
            &task.id,
            TaskUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )?;

        Ok(ToolOutput::success(format!(
            "Task '{}' completed.",
            task.title
        )))
    }
}

// ---------------------------------------------------------------------------
// DeleteTask
// ---------------------------------------------------------------------------

/// Tool deleting a single task, looked up by id or title.
pub struct DeleteTask {
    store: Arc<Mutex<TaskStore>>,
}

impl DeleteTask {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteTask {
    fn name(&self) -> &'static str {
        "delete_task"
    }

    fn description(&self) -> &'static str {
        "Delete a task. You can provide task_id OR task_title."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "task_title": {"type": "string", "description": "The title of the task to delete"}
            }
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let Some(task) = find_task(&self.store, context, &args).await? else {
            return Ok(ToolOutput::success("Task not found."));
        };

        let store = self.store.lock().await;
        store.delete(&context.user_id, &task.id)?;

        Ok(ToolOutput::success(format!(
            "Task '{}' deleted.",
            task.title
        )))
    }
}

// ---------------------------------------------------------------------------
// UpdateTask
// ---------------------------------------------------------------------------

/// Tool updating any subset of title/description/priority on a task.
pub struct UpdateTask {
    store: Arc<Mutex<TaskStore>>,
}

impl UpdateTask {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateTask {
    fn name(&self) -> &'static str {
        "update_task"
    }

    fn description(&self) -> &'static str {
        "Update details of an existing task. Look it up by task_id or task_title."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "task_title": {"type": "string", "description": "Current title of the task"},
                "title": {"type": "string", "description": "New title"},
                "description": {"type": "string", "description": "New description"},
                "priority": {"type": "string", "enum": PRIORITY_SCHEMA}
            }
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let Some(task) = find_task(&self.store, context, &args).await? else {
            return Ok(ToolOutput::success("Task not found."));
        };

        // Only fields present and non-null are applied; anything else in the
        // payload is ignored.
        let update = TaskUpdate {
            title: args["title"].as_str().map(|s| s.to_string()),
            description: args["description"].as_str().map(|s| s.to_string()),
            priority: args["priority"]
                .as_str()
                .map(|s| s.parse().unwrap_or_default()),
            completed: None,
        };

        let store = self.store.lock().await;
        let updated = store.update(&context.user_id, &task.id, update)?;
        let title = updated.map(|t| t.title).unwrap_or(task.title);

        Ok(ToolOutput::success(format!("Task '{title}' updated.")))
    }
}

// ---------------------------------------------------------------------------
// DeleteAllTasks
// ---------------------------------------------------------------------------

/// Tool deleting every task owned by the calling user.
pub struct DeleteAllTasks {
    store: Arc<Mutex<TaskStore>>,
}

impl DeleteAllTasks {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteAllTasks {
    fn name(&self) -> &'static str {
        "delete_all_tasks"
    }

    fn description(&self) -> &'static str {
        "Delete ALL tasks for the current user."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, context: &ToolContext, _args: serde_json::Value) -> Result<ToolOutput> {
        let store = self.store.lock().await;
        let count = store.delete_all(&context.user_id)?;

        if count == 0 {
            Ok(ToolOutput::success("No tasks to delete."))
        } else {
            Ok(ToolOutput::success(format!(
                "Successfully deleted all {count} tasks."
            )))
        }
    }
}

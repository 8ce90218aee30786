pub mod chat_store;
pub mod task_store;
pub mod user_store;

pub use chat_store::{ChatStore, Conversation, StoredMessage};
pub use task_store::{NewTask, Task, TaskFilter, TaskStore, TaskUpdate};
pub use user_store::{User, UserStore};

pub(crate) fn parse_timestamp(value: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|e| {
            tracing::warn!("failed to parse timestamp '{}': {e}, falling back to now", value);
            chrono::Utc::now()
        })
}

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use taskpilot_common::{ConversationId, Error, Result, UserId};
use tracing::info;

use crate::parse_timestamp;

/// Conversation header row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Persisted chat message loaded from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: ConversationId,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent storage for conversations and their message history.
pub struct ChatStore {
    conn: Connection,
}

impl ChatStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening chat store at {}", db_path.display());
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

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_conversations_user
                    ON conversations(user_id);

                CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL
                        REFERENCES conversations(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_messages_conversation
                    ON messages(conversation_id, created_at);",
            )
            .map_err(|e| Error::Database(format!("chat migration failed: {e}")))?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create and persist a fresh conversation for `user_id`.
    pub fn create_conversation(&self, user_id: &UserId) -> Result<Conversation> {
        let conversation = Conversation {
            id: ConversationId::new(),
            user_id: user_id.clone(),
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO conversations (id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![
                    conversation.id.as_str(),
                    conversation.user_id.as_str(),
                    conversation.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to create conversation: {e}")))?;

        Ok(conversation)
    }

    /// Fetch a conversation only when it exists AND belongs to `user_id`.
    pub fn find_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, created_at FROM conversations
                 WHERE id = ?1 AND user_id = ?2",
            )
            .map_err(|e| Error::Database(format!("failed to prepare conversation query: {e}")))?;

        let mut rows = stmt
            .query_map(
                params![conversation_id.as_str(), user_id.as_str()],
                |row| {
                    let id: String = row.get(0)?;
                    let user_id: String = row.get(1)?;
                    let created_raw: String = row.get(2)?;
                    Ok(Conversation {
                        id: ConversationId::from(id),
                        user_id: UserId::from(user_id),
                        created_at: parse_timestamp(&created_raw),
                    })
                },
            )
            .map_err(|e| Error::Database(format!("failed to find conversation: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| {
                Error::Database(format!("failed to read conversation row: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Look up who owns a conversation, regardless of the caller.
    pub fn conversation_owner(&self, conversation_id: &ConversationId) -> Result<Option<UserId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM conversations WHERE id = ?1")
            .map_err(|e| Error::Database(format!("failed to prepare owner query: {e}")))?;

        let mut rows = stmt
            .query_map(params![conversation_id.as_str()], |row| {
                let user_id: String = row.get(0)?;
                Ok(UserId::from(user_id))
            })
            .map_err(|e| Error::Database(format!("failed to query owner: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| {
                Error::Database(format!("failed to read owner row: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Append a single message; no content validation beyond NOT NULL.
    pub fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: &str,
        content: &str,
    ) -> Result<StoredMessage> {
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id,
                    message.conversation_id.as_str(),
                    message.role,
                    message.content,
                    message.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to append message: {e}")))?;

        Ok(message)
    }

    /// Load the most recent `limit` messages in chronological order.
    pub fn load_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, conversation_id, role, content, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )
            .map_err(|e| Error::Database(format!("failed to prepare message query: {e}")))?;

        let rows = stmt
            .query_map(params![conversation_id.as_str(), limit as i64], |row| {
                let id: String = row.get(0)?;
                let conversation_id: String = row.get(1)?;
                let created_raw: String = row.get(4)?;
                Ok(StoredMessage {
                    id,
                    conversation_id: ConversationId::from(conversation_id),
                    role: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_timestamp(&created_raw),
                })
            })
            .map_err(|e| Error::Database(format!("failed to load messages: {e}")))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(
                row.map_err(|e| Error::Database(format!("failed to read message row: {e}")))?,
            );
        }

        // Query is DESC for efficient tail fetch; return in chronological order.
        messages.reverse();
        Ok(messages)
    }

    /// Delete every message in every conversation owned by `user_id`.
    /// The conversation rows themselves remain. Returns the number removed.
    pub fn clear_history(&self, user_id: &UserId) -> Result<usize> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM messages WHERE conversation_id IN (
                    SELECT id FROM conversations WHERE user_id = ?1
                )",
                params![user_id.as_str()],
            )
            .map_err(|e| Error::Database(format!("failed to clear history: {e}")))?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::ChatStore;
    use taskpilot_common::{ConversationId, UserId};

    fn store() -> ChatStore {
        ChatStore::in_memory().expect("in-memory store should open")
    }

    #[test]
    fn conversation_lookup_is_owner_scoped() {
        let store = store();
        let alice = UserId::new();
        let bob = UserId::new();

        let conversation = store
            .create_conversation(&alice)
            .expect("conversation create should succeed");

        assert!(store
            .find_conversation(&alice, &conversation.id)
            .unwrap()
            .is_some());
        assert!(store
            .find_conversation(&bob, &conversation.id)
            .unwrap()
            .is_none());
        assert!(store
            .find_conversation(&alice, &ConversationId::new())
            .unwrap()
            .is_none());

        assert_eq!(
            store.conversation_owner(&conversation.id).unwrap(),
            Some(alice)
        );
        assert!(store
            .conversation_owner(&ConversationId::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn messages_come_back_in_chronological_order() {
        let store = store();
        let user = UserId::new();
        let conversation = store.create_conversation(&user).unwrap();

        for i in 0..5 {
            let msg = store
                .append_message(&conversation.id, "user", &format!("msg-{i}"))
                .expect("append should succeed");
            // Spread timestamps so ordering is decided by created_at, not rowid.
            store
                .connection()
                .execute(
                    "UPDATE messages SET created_at = ?1 WHERE id = ?2",
                    rusqlite::params![
                        (chrono::Utc::now() + chrono::Duration::seconds(i)).to_rfc3339(),
                        msg.id
                    ],
                )
                .unwrap();
        }

        let messages = store
            .load_recent_messages(&conversation.id, 10)
            .expect("load should succeed");
        assert_eq!(messages.len(), 5);
        for (i, msg) in messages.iter().enumerate() {
            assert_eq!(msg.content, format!("msg-{i}"));
        }
    }

    #[test]
    fn load_is_capped_to_most_recent_limit() {
        let store = store();
        let user = UserId::new();
        let conversation = store.create_conversation(&user).unwrap();

        for i in 0..8 {
            store
                .append_message(&conversation.id, "user", &format!("msg-{i}"))
                .unwrap();
        }

        let messages = store.load_recent_messages(&conversation.id, 3).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "msg-5");
        assert_eq!(messages[2].content, "msg-7");
    }

    #[test]
    fn clear_history_spans_all_user_conversations() {
        let store = store();
        let alice = UserId::new();
        let bob = UserId::new();

        let a1 = store.create_conversation(&alice).unwrap();
        let a2 = store.create_conversation(&alice).unwrap();
        let b1 = store.create_conversation(&bob).unwrap();

        store.append_message(&a1.id, "user", "hi").unwrap();
        store.append_message(&a1.id, "assistant", "hello").unwrap();
        store.append_message(&a2.id, "user", "another").unwrap();
        store.append_message(&b1.id, "user", "bob speaking").unwrap();

        let cleared = store.clear_history(&alice).expect("clear should succeed");
        assert_eq!(cleared, 3);

        assert!(store.load_recent_messages(&a1.id, 10).unwrap().is_empty());
        assert!(store.load_recent_messages(&a2.id, 10).unwrap().is_empty());
        assert_eq!(store.load_recent_messages(&b1.id, 10).unwrap().len(), 1);

        // Clearing again removes nothing.
        assert_eq!(store.clear_history(&alice).unwrap(), 0);
    }
}

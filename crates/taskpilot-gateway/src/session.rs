use std::sync::Arc;

use taskpilot_agents::ChatMessage;
use taskpilot_common::{ConversationId, Result, UserId};
use taskpilot_db::{ChatStore, Conversation, StoredMessage};
use tokio::sync::Mutex;
use tracing::debug;

/// How many stored messages are replayed into a turn's transcript.
pub const SESSION_HISTORY_LIMIT: usize = 20;

/// Owner-scoped conversation lifecycle over the chat store.
#[derive(Clone)]
pub struct SessionManager {
    chats: Arc<Mutex<ChatStore>>,
}

impl SessionManager {
    pub fn new(chats: Arc<Mutex<ChatStore>>) -> Self {
        Self { chats }
    }

    /// Resume the conversation iff the id exists AND belongs to `user_id`;
    /// anything else starts a fresh one. Existing rows are never mutated.
    pub async fn get_or_create(
        &self,
        user_id: &UserId,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Conversation> {
        let chats = self.chats.lock().await;

        if let Some(id) = conversation_id {
            if let Some(existing) = chats.find_conversation(user_id, id)? {
                return Ok(existing);
            }
            debug!("conversation {id} not resumable for this user, starting fresh");
        }

        chats.create_conversation(user_id)
    }

    /// Most recent [`SESSION_HISTORY_LIMIT`] messages, chronological order,
    /// converted to the agent transcript shape. Roles other than user and
    /// assistant are skipped.
    pub async fn history(&self, conversation_id: &ConversationId) -> Result<Vec<ChatMessage>> {
        let chats = self.chats.lock().await;
        let stored = chats.load_recent_messages(conversation_id, SESSION_HISTORY_LIMIT)?;

        Ok(stored
            .iter()
            .filter_map(|m| match m.role.as_str() {
                "user" => Some(ChatMessage::user(m.content.clone())),
                "assistant" => Some(ChatMessage::assistant(m.content.clone())),
                _ => None,
            })
            .collect())
    }

    /// Raw stored messages for the history endpoint.
    pub async fn stored_history(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<StoredMessage>> {
        let chats = self.chats.lock().await;
        chats.load_recent_messages(conversation_id, SESSION_HISTORY_LIMIT)
    }

    pub async fn append(
        &self,
        conversation_id: &ConversationId,
        role: &str,
        content: &str,
    ) -> Result<()> {
        let chats = self.chats.lock().await;
        chats.append_message(conversation_id, role, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_agents::{ChatRole, MessagePart};

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(Mutex::new(
            ChatStore::in_memory().expect("in-memory store should open"),
        )))
    }

    #[tokio::test]
    async fn resumes_own_conversation_but_not_foreign_ones() {
        let sessions = manager();
        let alice = UserId::new();
        let bob = UserId::new();

        let created = sessions.get_or_create(&alice, None).await.unwrap();

        let resumed = sessions
            .get_or_create(&alice, Some(&created.id))
            .await
            .unwrap();
        assert_eq!(resumed.id, created.id);

        // Bob passing Alice's id silently gets his own new conversation.
        let bobs = sessions
            .get_or_create(&bob, Some(&created.id))
            .await
            .unwrap();
        assert_ne!(bobs.id, created.id);
        assert_eq!(bobs.user_id, bob);

        // An unknown id also starts fresh.
        let fresh = sessions
            .get_or_create(&alice, Some(&ConversationId::new()))
            .await
            .unwrap();
        assert_ne!(fresh.id, created.id);
    }

    #[tokio::test]
    async fn history_maps_roles_and_keeps_order() {
        let sessions = manager();
        let user = UserId::new();
        let conversation = sessions.get_or_create(&user, None).await.unwrap();

        sessions.append(&conversation.id, "user", "hi").await.unwrap();
        sessions
            .append(&conversation.id, "assistant", "hello")
            .await
            .unwrap();
        sessions
            .append(&conversation.id, "system", "ignored")
            .await
            .unwrap();

        let history = sessions.history(&conversation.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].role, ChatRole::Assistant);
        match &history[1].content {
            MessagePart::Text(t) => assert_eq!(t, "hello"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn history_is_capped_to_the_most_recent_window() {
        let sessions = manager();
        let user = UserId::new();
        let conversation = sessions.get_or_create(&user, None).await.unwrap();

        for i in 0..(SESSION_HISTORY_LIMIT + 5) {
            sessions
                .append(&conversation.id, "user", &format!("msg-{i}"))
                .await
                .unwrap();
        }

        let history = sessions.history(&conversation.id).await.unwrap();
        assert_eq!(history.len(), SESSION_HISTORY_LIMIT);
        match &history[0].content {
            MessagePart::Text(t) => assert_eq!(t, "msg-5"),
            other => panic!("unexpected content: {other:?}"),
        }
    }
}

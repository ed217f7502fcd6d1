use async_trait::async_trait;
use std::collections::{ HashMap, VecDeque };
use tokio::sync::RwLock;
use crate::error::StoreError;
use crate::history::HistoryStore;
use crate::models::chat::ChatMessage;

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    conversations: RwLock<HashMap<String, VecDeque<ChatMessage>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
        max_messages: usize
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let log = conversations.entry(conversation_id.to_string()).or_default();
        log.extend(messages.iter().cloned());
        while log.len() > max_messages {
            log.pop_front();
        }
        Ok(())
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let conversations = self.conversations.read().await;
        let messages: Vec<ChatMessage> = conversations
            .get(conversation_id)
            .map(|log| {
                let skip = log.len().saturating_sub(limit);
                log.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.conversations.write().await.remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[tokio::test]
    async fn evicts_oldest_beyond_max() {
        let store = InMemoryHistoryStore::new();
        for text in ["a", "b", "c", "d"] {
            store.append_messages("c1", &[ChatMessage::new(Role::User, text)], 3).await.unwrap();
        }
        let messages = store.get_messages("c1", 10).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn limit_returns_most_recent_suffix() {
        let store = InMemoryHistoryStore::new();
        let batch: Vec<_> = ["a", "b", "c"].iter().map(|t| ChatMessage::new(Role::User, *t)).collect();
        store.append_messages("c1", &batch, 10).await.unwrap();
        let messages = store.get_messages("c1", 2).await.unwrap();
        assert_eq!(messages[0].content, "b");
        assert_eq!(messages[1].content, "c");
    }
}

//! Sliding-window conversation memory.
//!
//! The window is the most recent `max_messages` entries of a conversation, oldest
//! first. Every write trims the stored log back to that size, so the store never
//! holds more than the window for any conversation. Eviction is strict FIFO by
//! insertion order regardless of role. The system preamble is not stored here; it
//! is prepended at call time and therefore never evicted.

use std::sync::Arc;
use log::debug;
use crate::error::ChatError;
use crate::history::HistoryStore;
use crate::models::chat::{ ChatMessage, Role };

pub const DEFAULT_MAX_MESSAGES: usize = 20;

#[derive(Clone)]
pub struct MemoryWindow {
    store: Arc<dyn HistoryStore>,
    max_messages: usize,
}

impl MemoryWindow {
    pub fn new(store: Arc<dyn HistoryStore>, max_messages: usize) -> Result<Self, ChatError> {
        if max_messages == 0 {
            return Err(ChatError::invalid("max_messages must be at least 1"));
        }
        Ok(Self { store, max_messages })
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Returns the current window for `conversation_id`. Unknown ids yield an empty window.
    pub async fn load_context(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        ensure_conversation_id(conversation_id)?;
        let messages = self.store.get_messages(conversation_id, self.max_messages).await?;
        debug!("Loaded {} message(s) of context for conversation {}", messages.len(), conversation_id);
        Ok(messages)
    }

    pub async fn append(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str
    ) -> Result<(), ChatError> {
        ensure_conversation_id(conversation_id)?;
        self.store.append_messages(
            conversation_id,
            &[ChatMessage::new(role, content)],
            self.max_messages
        ).await?;
        Ok(())
    }

    /// Stores a user message and its reply as one unit, so a failed turn leaves no
    /// orphaned user message behind.
    pub async fn append_turn(
        &self,
        conversation_id: &str,
        user_message: &str,
        reply: &str
    ) -> Result<(), ChatError> {
        ensure_conversation_id(conversation_id)?;
        let turn = [ChatMessage::new(Role::User, user_message), ChatMessage::new(Role::Assistant, reply)];
        self.store.append_messages(conversation_id, &turn, self.max_messages).await?;
        Ok(())
    }

    pub async fn clear(&self, conversation_id: &str) -> Result<(), ChatError> {
        ensure_conversation_id(conversation_id)?;
        self.store.clear(conversation_id).await?;
        Ok(())
    }
}

pub(crate) fn ensure_conversation_id(conversation_id: &str) -> Result<(), ChatError> {
    if conversation_id.trim().is_empty() {
        return Err(ChatError::invalid("conversationId must not be blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistoryStore;

    fn window(max_messages: usize) -> MemoryWindow {
        MemoryWindow::new(Arc::new(InMemoryHistoryStore::new()), max_messages).unwrap()
    }

    fn contents(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn window_keeps_most_recent_suffix() {
        let memory = window(3);
        for text in ["a", "b", "c", "d"] {
            memory.append("conv", Role::User, text).await.unwrap();
        }
        assert_eq!(contents(&memory.load_context("conv").await.unwrap()), vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn returns_min_of_appended_and_max() {
        for max in 1..=5 {
            for k in 0..=7usize {
                let memory = window(max);
                let texts: Vec<String> = (0..k).map(|i| i.to_string()).collect();
                for text in &texts {
                    memory.append("conv", Role::User, text).await.unwrap();
                }
                let loaded = memory.load_context("conv").await.unwrap();
                let expected: Vec<&str> = texts[k.saturating_sub(max)..]
                    .iter()
                    .map(|s| s.as_str())
                    .collect();
                assert_eq!(contents(&loaded), expected, "max={} k={}", max, k);
            }
        }
    }

    #[tokio::test]
    async fn eviction_ignores_role() {
        let memory = window(2);
        memory.append("conv", Role::System, "persona").await.unwrap();
        memory.append("conv", Role::User, "q").await.unwrap();
        memory.append("conv", Role::Assistant, "a").await.unwrap();
        let loaded = memory.load_context("conv").await.unwrap();
        assert_eq!(contents(&loaded), vec!["q", "a"]);
    }

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        assert!(window(20).load_context("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_empties_and_is_idempotent() {
        let memory = window(20);
        memory.append_turn("conv", "hi", "hello").await.unwrap();
        memory.clear("conv").await.unwrap();
        assert!(memory.load_context("conv").await.unwrap().is_empty());
        memory.clear("conv").await.unwrap();
        memory.clear("unknown").await.unwrap();
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let memory = window(20);
        memory.append("left", Role::User, "left message").await.unwrap();
        memory.append("right", Role::User, "right message").await.unwrap();
        assert_eq!(contents(&memory.load_context("left").await.unwrap()), vec!["left message"]);
        assert_eq!(contents(&memory.load_context("right").await.unwrap()), vec!["right message"]);
        memory.clear("left").await.unwrap();
        assert_eq!(memory.load_context("right").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_ids_are_rejected() {
        let memory = window(20);
        assert!(matches!(memory.load_context(" ").await, Err(ChatError::InvalidArgument(_))));
        assert!(matches!(memory.append("", Role::User, "x").await, Err(ChatError::InvalidArgument(_))));
        assert!(matches!(memory.clear("\t").await, Err(ChatError::InvalidArgument(_))));
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(MemoryWindow::new(Arc::new(InMemoryHistoryStore::new()), 0).is_err());
    }
}

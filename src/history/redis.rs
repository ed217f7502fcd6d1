use async_trait::async_trait;
use crate::error::StoreError;
use crate::models::chat::{ ChatMessage, Role };
use crate::history::HistoryStore;
use log::{ debug, error };
use redis::{ Client, AsyncCommands };
use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize)]
struct StoredMessage {
    role: String,
    content: String,
    timestamp: i64,
}

/// One Redis list per conversation, oldest message at the head.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
}

impl RedisHistoryStore {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.key_prefix, conversation_id)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

fn decode(json_entry: &str) -> Result<ChatMessage, StoreError> {
    let stored = serde_json::from_str::<StoredMessage>(json_entry)
        .map_err(|e| StoreError::Decode(format!("history entry is not valid JSON: {}", e)))?;
    let role = stored.role.parse::<Role>().map_err(StoreError::Decode)?;
    Ok(ChatMessage {
        role,
        content: stored.content,
        timestamp: stored.timestamp,
    })
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
        max_messages: usize
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection().await?;
        let key = self.key(conversation_id);

        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            entries.push(
                serde_json::to_string(
                    &(StoredMessage {
                        role: message.role.as_str().to_string(),
                        content: message.content.clone(),
                        timestamp: message.timestamp,
                    })
                )?
            );
        }

        redis
            ::pipe()
            .atomic()
            .rpush(&key, entries)
            .ignore()
            .ltrim(&key, -(max_messages as isize), -1)
            .ignore()
            .query_async::<_, ()>(&mut conn).await?;
        debug!("Appended {} message(s) to {}", messages.len(), key);
        Ok(())
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let key = self.key(conversation_id);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn.lrange(&key, -(limit as isize), -1).await?;
        json_entries
            .iter()
            .map(|entry| decode(entry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                error!("Corrupt history under {}: {}", key, e);
                e
            })
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.del(self.key(conversation_id)).await?;
        Ok(())
    }
}

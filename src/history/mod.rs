mod memory;
mod redis;
mod sqlite;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::error::StoreError;
use crate::models::chat::ChatMessage;

pub use self::memory::InMemoryHistoryStore;
pub use self::redis::RedisHistoryStore;
pub use self::sqlite::SqliteHistoryStore;

/// Durable, append-only log of chat messages keyed by conversation id.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends `messages` in order and then evicts the oldest entries so that at most
    /// `max_messages` remain. Insertion and eviction form a single atomic unit.
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
        max_messages: usize
    ) -> Result<(), StoreError>;

    /// The `limit` most recent messages, oldest first.
    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError>;
}

pub async fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "sqlite" => {
            let store = SqliteHistoryStore::open(&args.history_host)?;
            Ok(Arc::new(store))
        }
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_prefix)?;
            store.ping().await?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(InMemoryHistoryStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub async fn initialize_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    create_history_store(args).await
}

use async_trait::async_trait;
use log::{ debug, info };
use rusqlite::{ params, Connection };
use std::path::Path;
use std::sync::{ Arc, Mutex };
use tokio::task;
use crate::error::StoreError;
use crate::history::HistoryStore;
use crate::models::chat::{ ChatMessage, Role };

const SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS chat_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation
        ON chat_messages(conversation_id, id);";

/// Relational store: one row per message, insertion order given by the rowid.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened SQLite history store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
        max_messages: usize
    ) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let conversation_id = conversation_id.to_string();
        let messages = messages.to_vec();
        task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            let tx = conn.transaction()?;
            for message in &messages {
                tx.execute(
                    "INSERT INTO chat_messages (conversation_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![conversation_id, message.role.as_str(), message.content, message.timestamp]
                )?;
            }
            let evicted = tx.execute(
                "DELETE FROM chat_messages
                 WHERE conversation_id = ?1
                   AND id NOT IN (
                       SELECT id FROM chat_messages
                       WHERE conversation_id = ?1
                       ORDER BY id DESC
                       LIMIT ?2
                   )",
                params![conversation_id, max_messages as i64]
            )?;
            tx.commit()?;
            if evicted > 0 {
                debug!("Evicted {} message(s) from conversation {}", evicted, conversation_id);
            }
            Ok(())
        }).await?
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let conn = self.conn.clone();
        let id = conversation_id.to_string();
        task::spawn_blocking(move || -> Result<Vec<ChatMessage>, StoreError> {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            let mut stmt = conn.prepare(
                "SELECT role, content, created_at FROM (
                     SELECT id, role, content, created_at FROM chat_messages
                     WHERE conversation_id = ?1
                     ORDER BY id DESC
                     LIMIT ?2
                 ) ORDER BY id ASC"
            )?;
            let rows = stmt
                .query_map(params![id, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut messages = Vec::with_capacity(rows.len());
            for (role, content, timestamp) in rows {
                let role = role.parse::<Role>().map_err(StoreError::Decode)?;
                messages.push(ChatMessage { role, content, timestamp });
            }
            Ok(messages)
        }).await?
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let id = conversation_id.to_string();
        task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            let removed = conn.execute(
                "DELETE FROM chat_messages WHERE conversation_id = ?1",
                params![id]
            )?;
            debug!("Cleared {} message(s) from conversation {}", removed, id);
            Ok(())
        }).await?
    }
}

use crate::cli::Args;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::history::{ initialize_history_store, HistoryStore };
use crate::llm::LlmConfig;
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::memory::{ ensure_conversation_id, MemoryWindow };
use crate::models::chat::{ ChatMessage, Role };

use futures::{ Stream, StreamExt };
use log::{ info, warn, error };
use std::error::Error;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Runs chat turns: window lookup, completion call, then persistence of the finished turn.
///
/// A turn is stored only once the reply exists, and the user message and reply are
/// written together. Failed or cancelled turns leave the conversation untouched.
#[derive(Clone)]
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    memory: MemoryWindow,
    config: Arc<ChatConfig>,
}

impl ChatAgent {
    /// The memory window is sized from `config.max_messages`.
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        history_store: Arc<dyn HistoryStore>,
        config: ChatConfig
    ) -> Result<Self, ChatError> {
        let memory = MemoryWindow::new(history_store, config.max_messages)?;
        Ok(Self {
            chat_client,
            memory,
            config: Arc::new(config),
        })
    }

    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let config = ChatConfig::from_args(args)?;
        let chat_config = LlmConfig {
            llm_type: args.chat_llm_type.parse()?,
            base_url: args.chat_base_url.clone(),
            api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
            completion_model: args.chat_model.clone(),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            args.chat_llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );

        let history_store = initialize_history_store(args).await?;
        Ok(Self::new(chat_client, history_store, config)?)
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryWindow {
        &self.memory
    }

    fn validate(&self, conversation_id: &str, message: &str) -> Result<(), ChatError> {
        ensure_conversation_id(conversation_id)?;
        if message.trim().is_empty() {
            return Err(ChatError::invalid("message must not be blank"));
        }
        if message.chars().count() > self.config.max_message_chars {
            return Err(
                ChatError::invalid(
                    format!("message must be <= {} characters", self.config.max_message_chars)
                )
            );
        }
        Ok(())
    }

    /// System preamble, then the current window, then the new user message.
    async fn build_prompt(
        &self,
        conversation_id: &str,
        message: &str
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let history = self.memory.load_context(conversation_id).await?;
        let mut prompt = Vec::with_capacity(history.len() + 2);
        prompt.push(ChatMessage::new(Role::System, self.config.system_prompt.as_str()));
        prompt.extend(history);
        prompt.push(ChatMessage::new(Role::User, message));
        Ok(prompt)
    }

    pub async fn respond(&self, conversation_id: &str, message: &str) -> Result<String, ChatError> {
        self.validate(conversation_id, message)?;
        let prompt = self.build_prompt(conversation_id, message).await?;
        info!("Conversation {}: sending {} message(s) to provider", conversation_id, prompt.len());

        let reply = self.chat_client
            .complete(&prompt).await
            .map_err(|e| {
                error!("LLM interaction error: {}", e);
                ChatError::Upstream(e)
            })?.response;
        if reply.trim().is_empty() {
            return Err(ChatError::Upstream("Provider returned an empty completion".into()));
        }

        self.memory.append_turn(conversation_id, message, &reply).await?;
        Ok(reply)
    }

    /// Streams the reply as it is generated. The turn is persisted only after the
    /// provider stream ends cleanly; dropping the returned stream cancels the call
    /// and nothing is stored.
    pub async fn respond_stream(
        &self,
        conversation_id: &str,
        message: &str
    ) -> Result<ReplyStream, ChatError> {
        self.validate(conversation_id, message)?;
        let prompt = self.build_prompt(conversation_id, message).await?;
        info!(
            "Conversation {}: streaming {} message(s) to provider",
            conversation_id,
            prompt.len()
        );
        let mut upstream = self.chat_client
            .stream_completion(&prompt).await
            .map_err(ChatError::Upstream)?;

        let memory = self.memory.clone();
        let conversation_id = conversation_id.to_string();
        let message = message.to_string();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut reply = String::new();
            loop {
                let chunk = tokio::select! {
                    chunk = upstream.next() => chunk,
                    _ = tx.closed() => {
                        warn!("Conversation {}: stream cancelled by client, discarding partial reply", conversation_id);
                        return;
                    }
                };
                match chunk {
                    Some(Ok(token)) => {
                        reply.push_str(&token);
                        if tx.send(Ok(token)).await.is_err() {
                            warn!("Conversation {}: stream cancelled by client, discarding partial reply", conversation_id);
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        error!("LLM stream error: {}", e);
                        let _ = tx.send(Err(ChatError::Upstream(e))).await;
                        return;
                    }
                    None => {
                        break;
                    }
                }
            }

            if reply.trim().is_empty() {
                let _ = tx.send(Err(ChatError::Upstream("Provider returned an empty completion".into()))).await;
                return;
            }
            if tx.is_closed() {
                warn!("Conversation {}: client left before the reply was stored", conversation_id);
                return;
            }
            if let Err(e) = memory.append_turn(&conversation_id, &message, &reply).await {
                error!("Failed to store streamed turn: {}", e);
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    pub async fn clear(&self, conversation_id: &str) -> Result<(), ChatError> {
        self.memory.clear(conversation_id).await?;
        info!("Conversation {} cleared", conversation_id);
        Ok(())
    }
}

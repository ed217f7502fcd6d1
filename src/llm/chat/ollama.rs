use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use super::{ http_stream_generate, BoxError, ChatClient, CompletionResponse, StreamLine, TokenStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use log::debug;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaStreamResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| "llama3.2".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url,
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }

    fn chat_request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = OllamaChatRequest {
            model: self.completion_model.clone(),
            messages: messages
                .iter()
                .map(|m| OllamaMessage { role: m.role.as_str().to_string(), content: m.content.clone() })
                .collect(),
            stream,
        };
        self.http.post(url).json(&req)
    }
}

fn parse_stream_line(line: &str) -> StreamLine {
    if line.is_empty() {
        return StreamLine::Skip;
    }
    match serde_json::from_str::<OllamaStreamResponse>(line) {
        Ok(resp) => {
            if let Some(error) = resp.error {
                return StreamLine::Error(error);
            }
            let token = resp.message.map(|m| m.content).filter(|c| !c.is_empty());
            match (token, resp.done) {
                (Some(tok), false) => StreamLine::Token(tok),
                (Some(tok), true) => StreamLine::Final(tok),
                (None, true) => StreamLine::Done,
                (None, false) => StreamLine::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            StreamLine::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, BoxError> {
        let resp = self
            .chat_request(messages, false)
            .send().await?
            .error_for_status()?
            .json::<OllamaChatResponse>().await?;
        Ok(CompletionResponse { response: resp.message.content })
    }

    async fn stream_completion(&self, messages: &[ChatMessage]) -> Result<TokenStream, BoxError> {
        Ok(http_stream_generate(self.chat_request(messages, true), parse_stream_line))
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_lines() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(parse_stream_line(line), StreamLine::Token("Hel".into()));
    }

    #[test]
    fn final_line_ends_stream() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_stream_line(line), StreamLine::Done);
    }

    #[test]
    fn content_on_the_done_line_is_the_last_token() {
        let line = r#"{"message":{"role":"assistant","content":"!"},"done":true}"#;
        assert_eq!(parse_stream_line(line), StreamLine::Final("!".into()));
    }

    #[test]
    fn error_line_is_reported() {
        let line = r#"{"error":"model runner crashed"}"#;
        assert_eq!(parse_stream_line(line), StreamLine::Error("model runner crashed".into()));
    }

    #[test]
    fn ignores_garbage() {
        assert_eq!(parse_stream_line(""), StreamLine::Skip);
        assert_eq!(parse_stream_line("{not json"), StreamLine::Skip);
    }

    #[test]
    fn defaults_to_local_endpoint() {
        let client = OllamaClient::new(None, None);
        assert_eq!(client.get_base_url().as_deref(), Some("http://localhost:11434"));
    }
}

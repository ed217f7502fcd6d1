use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, BoxError, ChatClient, CompletionResponse, StreamLine, TokenStream };
use crate::llm::LlmConfig;
use crate::models::chat::ChatMessage;

/// Any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIError>,
}

#[derive(Deserialize)]
struct OpenAIError {
    message: String,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, BoxError> {
        let chat_model = model.unwrap_or_else(|| "gpt-4o-mini".to_string());
        let api_url = base_url.unwrap_or_else(|| "https://api.openai.com".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as BoxError)?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| "OpenAI API key is required".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn chat_request(&self, messages: &[ChatMessage], stream: bool) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| OpenAIMessage { role: m.role.as_str().to_string(), content: m.content.clone() })
                .collect(),
            temperature: 0.7,
            max_completion_tokens: Some(2048),
            stream: stream.then_some(true),
        }
    }
}

fn parse_sse_line(line: &str) -> StreamLine {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None => return StreamLine::Skip,
    };
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(stream_resp) => {
            if let Some(error) = stream_resp.error {
                return StreamLine::Error(error.message);
            }
            let mut token = String::new();
            let mut finished = false;
            for choice in stream_resp.choices {
                if let Some(content) = choice.delta.content {
                    token.push_str(&content);
                }
                if choice.finish_reason.is_some() {
                    finished = true;
                }
            }
            match (token.is_empty(), finished) {
                (false, false) => StreamLine::Token(token),
                (false, true) => StreamLine::Final(token),
                (true, true) => StreamLine::Done,
                (true, false) => StreamLine::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            StreamLine::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, BoxError> {
        let resp = self.http
            .post(self.completions_url())
            .json(&self.chat_request(messages, false))
            .send().await?
            .error_for_status()?
            .json::<OpenAIResponse>().await?;

        let content = resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| "No response from OpenAI API".to_string())?
            .message.content;

        Ok(CompletionResponse { response: content })
    }

    async fn stream_completion(&self, messages: &[ChatMessage]) -> Result<TokenStream, BoxError> {
        let request = self.http
            .post(self.completions_url())
            .json(&self.chat_request(messages, true));
        Ok(http_stream_generate(request, parse_sse_line))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> OpenAIChatClient {
        OpenAIChatClient::new("sk-test".into(), None, Some(base_url.into())).unwrap()
    }

    #[test]
    fn resolves_completions_url() {
        assert_eq!(client("https://api.openai.com").completions_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(client("http://localhost:8000/v1/").completions_url(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(
            client("https://proxy.local/v1/chat/completions").completions_url(),
            "https://proxy.local/v1/chat/completions"
        );
    }

    #[test]
    fn parses_delta_tokens() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), StreamLine::Token("Hi".into()));
    }

    #[test]
    fn done_markers_end_stream() {
        assert_eq!(parse_sse_line("data: [DONE]"), StreamLine::Done);
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line), StreamLine::Done);
    }

    #[test]
    fn error_payload_is_reported() {
        let line = r#"data: {"error":{"message":"overloaded","type":"server_error"}}"#;
        assert_eq!(parse_sse_line(line), StreamLine::Error("overloaded".into()));
    }

    #[test]
    fn final_delta_keeps_its_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"."},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line), StreamLine::Final(".".into()));
    }

    #[test]
    fn skips_non_data_lines() {
        assert_eq!(parse_sse_line(""), StreamLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), StreamLine::Skip);
    }

    #[test]
    fn requires_api_key() {
        let config = LlmConfig { llm_type: crate::llm::LlmType::OpenAI, ..LlmConfig::default() };
        assert!(OpenAIChatClient::from_config(&config).is_err());
    }

    #[test]
    fn streaming_flag_only_serialized_when_set() {
        let c = client("https://api.openai.com");
        let body = serde_json::to_value(c.chat_request(&[], false)).unwrap();
        assert!(body.get("stream").is_none());
        let body = serde_json::to_value(c.chat_request(&[], true)).unwrap();
        assert_eq!(body["stream"], serde_json::json!(true));
    }
}

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;
use log::{ debug, warn };
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Incremental completion text; ends when the provider reports completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// Remote chat-completion provider. `messages` is the full prompt: system preamble,
/// windowed history and the new user message, in that order.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, BoxError>;

    /// Providers without native streaming deliver the whole reply as one chunk.
    async fn stream_completion(&self, messages: &[ChatMessage]) -> Result<TokenStream, BoxError> {
        let response = self.complete(messages).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(response.response) })))
    }

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// Posts `request` and feeds every complete response line through `line_parser`,
/// forwarding the tokens it yields. Lines split across network chunks are reassembled.
///
/// The stream only ends cleanly after the parser reports completion. A provider error
/// line, a transport error, or a body that ends early all surface as a final `Err`.
/// The spawned reader stops as soon as the receiving side is dropped.
pub fn http_stream_generate(
    request: reqwest::RequestBuilder,
    line_parser: fn(&str) -> StreamLine
) -> TokenStream {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };
        if let Err(e) = resp.error_for_status_ref() {
            let _ = tx.send(Err(Box::new(e) as _)).await;
            return;
        }

        let mut bytes = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let chunk = tokio::select! {
                chunk = bytes.next() => chunk,
                _ = tx.closed() => {
                    debug!("Stream receiver dropped, abandoning provider response");
                    return;
                }
            };
            match chunk {
                Some(Ok(buf)) => {
                    pending.extend_from_slice(&buf);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        let parsed = line_parser(String::from_utf8_lossy(&line).trim_end());
                        if !forward_line(parsed, &tx).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
                None => {
                    break;
                }
            }
        }

        if !pending.is_empty() {
            let parsed = line_parser(String::from_utf8_lossy(&pending).trim_end());
            if !forward_line(parsed, &tx).await {
                return;
            }
        }
        warn!("Provider stream ended without a completion marker");
        let _ = tx.send(Err("Provider stream ended before the reply was complete".into())).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Sends whatever `line` carries; returns whether reading should continue.
async fn forward_line(line: StreamLine, tx: &mpsc::Sender<Result<String, BoxError>>) -> bool {
    match line {
        StreamLine::Token(tok) => tx.send(Ok(tok)).await.is_ok(),
        StreamLine::Final(tok) => {
            let _ = tx.send(Ok(tok)).await;
            false
        }
        StreamLine::Done => false,
        StreamLine::Error(message) => {
            let _ = tx.send(Err(message.into())).await;
            false
        }
        StreamLine::Skip => true,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StreamLine {
    Token(String),
    /// Last token; the provider reported completion on the same line.
    Final(String),
    Done,
    Error(String),
    Skip,
}

/// One-shot HTTP server that answers the first request with a streamed body.
#[cfg(test)]
pub(crate) mod test_server {
    use std::time::Duration;
    use tokio::io::{ AsyncReadExt, AsyncWriteExt };
    use tokio::net::{ TcpListener, TcpStream };
    use tokio::sync::oneshot;

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Writes each part separately with a short pause so they arrive as distinct
    /// network chunks. With `hold_open`, the connection stays up after the last part
    /// and the returned receiver fires once the client hangs up.
    pub(crate) async fn serve(
        parts: Vec<&'static str>,
        hold_open: bool
    ) -> (String, oneshot::Receiver<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n").await
                .unwrap();
            for part in parts {
                socket.write_all(part.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if hold_open {
                let mut buf = [0u8; 64];
                let _ = socket.read(&mut buf).await;
                let _ = closed_tx.send(());
            }
        });

        (format!("http://{}", addr), closed_rx)
    }
}

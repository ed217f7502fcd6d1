use crate::agent::ChatAgent;
use crate::error::ChatError;
use crate::models::api::{ ChatRequest, ChatResponse, ErrorBody, SessionResponse };
use std::collections::BTreeMap;
use std::convert::Infallible;
use axum::{
    routing::{ delete, get, post },
    Router,
    Json,
    extract::{ OriginalUri, Path, State, rejection::JsonRejection },
    response::{ IntoResponse, Response, sse::{ Event, KeepAlive, Sse } },
    http::{ header::CONTENT_TYPE, HeaderValue, Method, StatusCode },
};
use chrono::{ SecondsFormat, Utc };
use futures::{ Stream, StreamExt };
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{ AllowOrigin, CorsLayer };
use log::{ error, info, warn };
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    agent: ChatAgent,
}

/// Error envelope returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    path: String,
    fields: Option<BTreeMap<String, String>>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, path: &OriginalUri) -> Self {
        Self {
            status,
            message: message.into(),
            path: path.0.path().to_string(),
            fields: None,
        }
    }

    fn validation(fields: BTreeMap<String, String>, path: &OriginalUri) -> Self {
        Self {
            fields: Some(fields),
            ..Self::new(StatusCode::BAD_REQUEST, "Validation failed", path)
        }
    }

    fn from_chat(err: ChatError, path: &OriginalUri) -> Self {
        match err {
            ChatError::InvalidArgument(message) => Self::new(StatusCode::BAD_REQUEST, message, path),
            ChatError::Upstream(e) => {
                error!("{} failed upstream: {}", path.0.path(), e);
                Self::new(StatusCode::BAD_GATEWAY, "Upstream provider failed", path)
            }
            ChatError::Store(e) => {
                error!("{} failed in message store: {}", path.0.path(), e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Unexpected error", path)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status: self.status.as_u16(),
            error: self.status.canonical_reason().unwrap_or("Unknown").to_string(),
            message: self.message,
            path: self.path,
            fields: self.fields,
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn build_router(agent: ChatAgent, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    info!("CORS allowed origins: {:?}", allowed_origins);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/session", post(create_session_handler))
        .route("/api/session/{conversation_id}", delete(delete_session_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(AppState { agent })
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn create_session_handler() -> Json<SessionResponse> {
    let conversation_id = Uuid::new_v4().to_string();
    info!("Minted conversation {}", conversation_id);
    Json(SessionResponse { conversation_id })
}

async fn delete_session_handler(
    State(state): State<AppState>,
    uri: OriginalUri,
    Path(conversation_id): Path<String>
) -> Result<StatusCode, ApiError> {
    state.agent
        .clear(&conversation_id).await
        .map_err(|e| ApiError::from_chat(e, &uri))?;
    Ok(StatusCode::NO_CONTENT)
}

fn validated(
    state: &AppState,
    uri: &OriginalUri,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<ChatRequest, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text(), uri)
    })?;
    let fields = request.validate(state.agent.config().max_message_chars);
    if !fields.is_empty() {
        return Err(ApiError::validation(fields, uri));
    }
    Ok(request)
}

async fn chat_handler(
    State(state): State<AppState>,
    uri: OriginalUri,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatResponse>, ApiError> {
    let request = validated(&state, &uri, payload)?;
    let reply = state.agent
        .respond(&request.conversation_id, &request.message).await
        .map_err(|e| ApiError::from_chat(e, &uri))?;
    Ok(Json(ChatResponse { conversation_id: request.conversation_id, reply }))
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    uri: OriginalUri,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = validated(&state, &uri, payload)?;
    let replies = state.agent
        .respond_stream(&request.conversation_id, &request.message).await
        .map_err(|e| ApiError::from_chat(e, &uri))?;

    // Tokens as plain data events, then exactly one terminal `done` or `error` event.
    let events = futures::stream
        ::unfold(Some(replies), |state| async move {
            let mut replies = state?;
            match replies.next().await {
                Some(Ok(token)) => Some((Event::default().data(token.replace('\r', "")), Some(replies))),
                Some(Err(e)) => {
                    let message = match e {
                        ChatError::InvalidArgument(message) => message,
                        ChatError::Upstream(_) => "Upstream provider failed".to_string(),
                        ChatError::Store(_) => "Unexpected error".to_string(),
                    };
                    Some((Event::default().event("error").data(message), None))
                }
                None => Some((Event::default().event("done").data("[DONE]"), None)),
            }
        })
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

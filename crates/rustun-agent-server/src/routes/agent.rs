use crate::state::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use rustun_agent::models::chat::{ChatRequest, StreamEvent};
use rustun_agent::models::tool::Tool;
use serde::Serialize;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info};

/// Error body shared by every agent endpoint
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: u16,
    message: String,
    error: String,
}

fn error_response(status: StatusCode, message: &str, error: impl Into<String>) -> Response {
    let body = ErrorResponse {
        code: status.as_u16(),
        message: message.to_string(),
        error: error.into(),
    };
    (status, Json(body)).into_response()
}

/// Unwraps the request body, rejecting malformed JSON and empty messages
fn validate(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, Response> {
    let Json(request) = payload.map_err(|rejection| {
        error_response(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            rejection.body_text(),
        )
    })?;
    if request.message.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "message is required",
        ));
    }
    Ok(request)
}

/// Server-sent events body: one `data: <json>` frame per agent event.
///
/// Dropping the response, which axum does when the client disconnects, cancels the run.
pub struct SseResponse {
    events: ReceiverStream<StreamEvent>,
    _cancel_on_drop: DropGuard,
}

impl SseResponse {
    fn new(events: ReceiverStream<StreamEvent>, cancel: CancellationToken) -> Self {
        Self {
            events,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, serde_json::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx).map(|opt| {
            opt.map(|event| {
                serde_json::to_string(&event).map(|data| Bytes::from(format!("data: {data}\n\n")))
            })
        })
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
                (HeaderName::from_static("x-accel-buffering"), "no"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match validate(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(history = request.history.len(), "chat request");

    match state.agent.chat(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            error!(error = %err, code = err.code(), "chat failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Agent error", err.to_string())
        }
    }
}

async fn stream_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match validate(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(history = request.history.len(), "streaming chat request");

    let cancel = CancellationToken::new();
    let events = state.agent.chat_stream(request, cancel.clone());
    SseResponse::new(events, cancel).into_response()
}

async fn tools_handler(State(state): State<AppState>) -> Json<Vec<Tool>> {
    Json(state.agent.tools().to_vec())
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/agent/chat", post(chat_handler))
        .route("/api/agent/chat/stream", post(stream_handler))
        .route("/api/agent/tools", get(tools_handler))
        .with_state(state)
}

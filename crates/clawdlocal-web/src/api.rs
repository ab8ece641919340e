//! REST API route handlers.
//!
//! Every handler returns JSON.  Failures are `(StatusCode, {"error": ...})`
//! pairs produced by [`error_response`].

use std::collections::HashMap;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use clawdlocal_agent::{AgentError, AgentInfo, MemoryTier};
use clawdlocal_kernel::{Event, KernelError, Message, ToolArgs, ToolCall, ToolDefinition, ToolResult};
use clawdlocal_store::{MemoryEntry, MemoryStats};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::state::AppState;

/// Error half of every fallible handler.
pub type ApiError = (StatusCode, Json<Value>);

pub type ApiResult<T> = Result<T, ApiError>;

/// Map an agent error onto an HTTP status.
pub fn error_response(err: AgentError) -> ApiError {
    let status = match &err {
        AgentError::Kernel(
            KernelError::QueueFull { .. } | KernelError::NotRunning | KernelError::QueueClosed,
        ) => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::Kernel(KernelError::NoHandlersForType { .. }) => StatusCode::NOT_FOUND,
        AgentError::Kernel(KernelError::Handler { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        AgentError::Payload(_) => StatusCode::BAD_REQUEST,
        AgentError::TierDisabled { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), error = %err, "request failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
    }
    (status, Json(json!({ "error": err.to_string() })))
}

fn bad_request(reason: &str) -> ApiError {
    error_response(AgentError::Payload(reason.to_owned()))
}

// ---------------------------------------------------------------------------
// GET /health, GET {prefix}/agent
// ---------------------------------------------------------------------------

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": state.agent.config().agent.version,
    }))
}

pub async fn agent_info(State(state): State<AppState>) -> Json<AgentInfo> {
    Json(state.agent.info())
}

// ---------------------------------------------------------------------------
// POST {prefix}/events
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Queue an event.  Responds 201 with the event as queued, including its
/// assigned id.
pub async fn post_event(
    State(state): State<AppState>,
    Json(body): Json<EventRequest>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    if body.event_type.trim().is_empty() {
        return Err(bad_request("event type must not be empty"));
    }

    let mut event = Event::new(body.event_type, body.data);
    event.metadata = body.metadata;

    state.agent.emit(event.clone()).map_err(error_response)?;
    tracing::debug!(event_id = %event.id, event_type = %event.event_type, "event accepted");
    Ok((StatusCode::CREATED, Json(event)))
}

// ---------------------------------------------------------------------------
// POST {prefix}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default)]
    pub payload: Value,
}

fn default_source() -> String {
    "web".into()
}

fn default_target() -> String {
    "agent".into()
}

/// Route a message and return it with every handler output attached.
///
/// When a handler fails the error body also carries the message, so the
/// outputs of the handlers that succeeded are not lost.
pub async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<MessageRequest>,
) -> ApiResult<Json<Message>> {
    if body.message_type.trim().is_empty() {
        return Err(bad_request("message type must not be empty"));
    }

    let mut message = Message::new(body.message_type, body.source, body.target, body.payload);
    match state.agent.route_message(&mut message).await {
        Ok(()) => Ok(Json(message)),
        Err(err) => {
            let (status, Json(mut body)) = error_response(err);
            body["message"] = serde_json::to_value(&message).unwrap_or_default();
            Err((status, Json(body)))
        }
    }
}

// ---------------------------------------------------------------------------
// {prefix}/memory/...
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MemoryWrite {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    /// Seconds; `0` disables expiry, absent means the configured default.
    /// Ignored by the long-term tier.
    #[serde(default)]
    pub ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub long_term: bool,
}

fn list(state: &AppState, tier: MemoryTier) -> ApiResult<Json<Vec<MemoryEntry>>> {
    state
        .agent
        .memory()
        .list(tier)
        .map(Json)
        .map_err(error_response)
}

async fn store(state: &AppState, tier: MemoryTier, body: MemoryWrite) -> ApiResult<StatusCode> {
    if body.key.is_empty() {
        return Err(bad_request("memory key must not be empty"));
    }
    state
        .agent
        .memory()
        .store(tier, &body.key, body.value, body.ttl.map(Duration::from_secs))
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete(state: &AppState, tier: MemoryTier, key: &str) -> ApiResult<StatusCode> {
    let existed = state
        .agent
        .memory()
        .delete(tier, key)
        .await
        .map_err(error_response)?;
    if existed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no {tier} entry for key `{key}`") })),
        ))
    }
}

pub async fn list_short_term(State(state): State<AppState>) -> ApiResult<Json<Vec<MemoryEntry>>> {
    list(&state, MemoryTier::ShortTerm)
}

pub async fn list_long_term(State(state): State<AppState>) -> ApiResult<Json<Vec<MemoryEntry>>> {
    list(&state, MemoryTier::LongTerm)
}

pub async fn store_short_term(
    State(state): State<AppState>,
    Json(body): Json<MemoryWrite>,
) -> ApiResult<StatusCode> {
    store(&state, MemoryTier::ShortTerm, body).await
}

pub async fn store_long_term(
    State(state): State<AppState>,
    Json(body): Json<MemoryWrite>,
) -> ApiResult<StatusCode> {
    store(&state, MemoryTier::LongTerm, body).await
}

pub async fn delete_short_term(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    delete(&state, MemoryTier::ShortTerm, &key).await
}

pub async fn delete_long_term(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    delete(&state, MemoryTier::LongTerm, &key).await
}

pub async fn memory_stats(State(state): State<AppState>) -> Json<MemoryStats> {
    Json(state.agent.memory().manager().stats())
}

/// Case-insensitive substring search over keys and values, newest first.
pub async fn search_memory(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<MemoryEntry>> {
    Json(
        state
            .agent
            .memory()
            .manager()
            .search(&params.q, params.long_term),
    )
}

// ---------------------------------------------------------------------------
// {prefix}/tools
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ToolExecuteRequest {
    #[serde(default)]
    pub parameters: ToolArgs,
}

pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    Json(state.agent.tools().definitions())
}

/// Run a tool.  Always 200: a failed call is reported in the result body.
pub async fn execute_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ToolExecuteRequest>,
) -> Json<ToolResult> {
    Json(
        state
            .agent
            .execute_tool(ToolCall::new(name, body.parameters))
            .await,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_errors_map_to_statuses() {
        let (status, _) = error_response(KernelError::QueueFull { capacity: 1 }.into());
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = error_response(KernelError::NotRunning.into());
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, Json(body)) = error_response(
            KernelError::NoHandlersForType {
                message_type: "x".into(),
            }
            .into(),
        );
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("x"));
    }

    #[test]
    fn agent_errors_map_to_statuses() {
        let (status, _) = error_response(AgentError::TierDisabled { tier: "long_term" });
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = error_response(AgentError::Payload("bad".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

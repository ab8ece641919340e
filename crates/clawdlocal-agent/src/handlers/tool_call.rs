//! Tool-call handlers.
//!
//! Both handlers accept the same payload shape:
//!
//! ```json
//! { "id": "optional-call-id", "tool_name": "file_read", "args": { "filepath": "a.txt" } }
//! ```
//!
//! `name` is accepted as an alias of `tool_name`.  The call id defaults to
//! the id of the carrying event or message.  The [`ToolResult`] is appended
//! as an output; a failing tool is a successful dispatch with an error
//! result, not a handler error.

use async_trait::async_trait;
use clawdlocal_kernel::{
    Event, EventHandler, EventType, HandlerContext, HandlerResult, Message, MessageHandler,
    MessageType, ToolArgs, ToolCall, ToolRegistry, ToolResult,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AgentError, Result};

/// Priority of [`ToolCallMessageHandler`].
pub const TOOL_CALL_PRIORITY: i32 = 200;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A tool invocation decoded from an event or message payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: Option<String>,
    pub tool_name: String,
    pub args: ToolArgs,
}

impl ToolCallRequest {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let obj = payload
            .as_object()
            .ok_or_else(|| AgentError::Payload("tool call payload must be an object".into()))?;

        let tool_name = obj
            .get("tool_name")
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AgentError::Payload("tool call payload is missing 'tool_name'".into()))?
            .to_owned();

        let args = match obj.get("args") {
            None | Some(Value::Null) => ToolArgs::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(AgentError::Payload("'args' must be an object".into())),
        };

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Ok(Self { id, tool_name, args })
    }

    /// Build the registry call, using `fallback_id` when no id was given.
    pub fn into_call(self, fallback_id: &str) -> ToolCall {
        let mut call = ToolCall::new(self.tool_name, self.args);
        call.id = self.id.unwrap_or_else(|| fallback_id.to_owned());
        call
    }
}

async fn run(registry: &ToolRegistry, ctx: &HandlerContext, call: ToolCall) -> ToolResult {
    let tool = call.name.clone();
    let result = registry.execute_tool(ctx, call).await;
    if result.is_ok() {
        info!(tool = %tool, call_id = %result.id, "tool call succeeded");
    } else {
        warn!(tool = %tool, call_id = %result.id, error = %result.error, "tool call failed");
    }
    result
}

// ---------------------------------------------------------------------------
// Event handler
// ---------------------------------------------------------------------------

/// Runs `tool_call` events.
#[derive(Debug, Clone)]
pub struct ToolCallEventHandler {
    registry: ToolRegistry,
}

impl ToolCallEventHandler {
    pub const NAME: &'static str = "tool_call";

    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventHandler for ToolCallEventHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, event_type: &EventType) -> bool {
        *event_type == EventType::TOOL_CALL
    }

    async fn handle(&self, ctx: &HandlerContext, event: &mut Event) -> HandlerResult {
        let call = ToolCallRequest::from_payload(&event.data)?.into_call(&event.id);
        let result = run(&self.registry, ctx, call).await;
        event.push_output(Self::NAME, serde_json::to_value(&result)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message handler
// ---------------------------------------------------------------------------

/// Runs tool calls carried by `tool_response` messages.
#[derive(Debug, Clone)]
pub struct ToolCallMessageHandler {
    registry: ToolRegistry,
}

impl ToolCallMessageHandler {
    pub const NAME: &'static str = "tool_call";

    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for ToolCallMessageHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, message_type: &MessageType) -> bool {
        *message_type == MessageType::TOOL_RESPONSE
    }

    fn priority(&self) -> i32 {
        TOOL_CALL_PRIORITY
    }

    async fn handle(&self, ctx: &HandlerContext, message: &mut Message) -> HandlerResult {
        let call = ToolCallRequest::from_payload(&message.payload)?.into_call(&message.id);
        let result = run(&self.registry, ctx, call).await;
        message.push_output(Self::NAME, serde_json::to_value(&result)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Tool registry and execution.
//!
//! A [`Tool`] is a named, schema-described async operation.  Tools live in a
//! [`ToolRegistry`] keyed by name.  [`ToolRegistry::execute_tool`] never
//! fails: a missing tool, a tool error, a panic or a cancellation are all
//! reported through [`ToolResult::error`], so callers branch on a single
//! success check.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::context::HandlerContext;
use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Arguments passed to a tool: a JSON object.
pub type ToolArgs = Map<String, Value>;

/// Error type returned by tool functions.
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by a tool function.
pub type ToolFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, ToolError>> + Send>>;

/// Type-erased tool function.
pub type ToolFn = Arc<dyn Fn(HandlerContext, ToolArgs) -> ToolFuture + Send + Sync>;

/// A named, invocable operation.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the accepted arguments.
    pub parameters: Value,
    handler: ToolFn,
}

impl Tool {
    /// Build a tool from an async closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(HandlerContext, ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ToolError>> + Send + 'static,
    {
        let handler: ToolFn =
            Arc::new(move |ctx: HandlerContext, args: ToolArgs| -> ToolFuture {
                Box::pin(f(ctx, args))
            });

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    /// The serializable part of the tool.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Invoke the tool function directly.
    pub fn call(&self, ctx: HandlerContext, args: ToolArgs) -> ToolFuture {
        (self.handler)(ctx, args)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Name, description and parameter schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A request to run a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: ToolArgs,
}

impl ToolCall {
    /// Create a call with a fresh id.
    pub fn new(name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            args,
        }
    }
}

/// Outcome of a tool call.  Exactly one of `result` / `error` is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ToolResult {
    fn success(call: &ToolCall, value: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result: Some(value),
            error: String::new(),
        }
    }

    fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error.push_str("tool failed");
        }
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result: None,
            error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ToolRegistry
// ---------------------------------------------------------------------------

/// Name-keyed tool map.
///
/// Cloning is cheap; clones share the same map.  Map shards are locked only
/// for lookup and registration, never across a tool invocation.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<Tool>>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.  Fails if the name is already taken.
    pub fn register_tool(&self, tool: Tool) -> Result<()> {
        match self.tools.entry(tool.name.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(tool = %tool.name, "tool already registered");
                Err(KernelError::AlreadyRegistered { name: tool.name })
            }
            Entry::Vacant(slot) => {
                tracing::info!(tool = %tool.name, "tool registered");
                slot.insert(Arc::new(tool));
                Ok(())
            }
        }
    }

    /// Remove a tool.  Calls already executing keep their own handle to it.
    pub fn unregister(&self, name: &str) -> Option<Arc<Tool>> {
        let removed = self.tools.remove(name).map(|(_, tool)| tool);
        if removed.is_some() {
            tracing::info!(tool = %name, "tool unregistered");
        }
        removed
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all registered tools, in no particular order.
    pub fn list_tools(&self) -> Vec<Arc<Tool>> {
        self.tools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.iter().map(|entry| entry.value().definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool.  Never fails; see [`ToolResult`].
    pub async fn execute_tool(&self, ctx: &HandlerContext, call: ToolCall) -> ToolResult {
        // Clone the Arc out so no shard lock is held while the tool runs.
        let Some(tool) = self.get_tool(&call.name) else {
            tracing::warn!(tool = %call.name, call_id = %call.id, "tool not found");
            return ToolResult::failure(&call, format!("tool not found: {}", call.name));
        };

        tracing::debug!(tool = %call.name, call_id = %call.id, "executing tool");
        let started = std::time::Instant::now();

        let invocation = AssertUnwindSafe(tool.call(ctx.clone(), call.args.clone())).catch_unwind();
        let outcome = tokio::select! {
            biased;
            () = ctx.cancelled() => {
                tracing::warn!(tool = %call.name, call_id = %call.id, "tool execution cancelled");
                return ToolResult::failure(&call, "tool execution cancelled");
            }
            outcome = invocation => outcome,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(value)) => {
                tracing::info!(tool = %call.name, call_id = %call.id, elapsed_ms, "tool succeeded");
                ToolResult::success(&call, value)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    tool = %call.name,
                    call_id = %call.id,
                    elapsed_ms,
                    error = %e,
                    "tool failed"
                );
                ToolResult::failure(&call, e.to_string())
            }
            Err(_) => {
                tracing::error!(tool = %call.name, call_id = %call.id, "tool panicked");
                ToolResult::failure(&call, format!("tool panicked: {}", call.name))
            }
        }
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Events and event handlers.
//!
//! An [`Event`] is a queued unit of work consumed by the single dispatch task
//! of the [`EventLoop`](crate::EventLoop).  Handlers are matched against the
//! event's [`EventType`] by predicate ([`EventHandler::can_handle`]), so new
//! handler kinds never require changes to the loop itself.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::{HandlerContext, HandlerOutput, HandlerResult};

// ---------------------------------------------------------------------------
// Event type tag
// ---------------------------------------------------------------------------

/// Type tag of an event.
///
/// The set of tags is open: the associated constants cover the built-in
/// kinds, and any other string is accepted via [`EventType::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    pub const MESSAGE: Self = Self(Cow::Borrowed("message"));
    pub const TOOL_CALL: Self = Self(Cow::Borrowed("tool_call"));
    pub const SYSTEM: Self = Self(Cow::Borrowed("system"));
    pub const HEARTBEAT: Self = Self(Cow::Borrowed("heartbeat"));
    pub const CRON: Self = Self(Cow::Borrowed("cron"));
    pub const MEMORY_STORE: Self = Self(Cow::Borrowed("memory_store"));
    pub const MEMORY_QUERY: Self = Self(Cow::Borrowed("memory_query"));
    pub const MEMORY_DELETE: Self = Self(Cow::Borrowed("memory_delete"));

    /// Create a type tag from an arbitrary string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A unit of work flowing through the event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier assigned by the producer.  Must be unique per emission;
    /// collisions are a caller error and are not detected.
    pub id: String,
    /// Type tag used to select handlers.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Opaque payload.
    #[serde(default)]
    pub data: Value,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    /// Values attached by handlers during dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<HandlerOutput>,
}

impl Event {
    /// Create an event with a fresh time-ordered id and the current time.
    pub fn new(event_type: impl Into<EventType>, data: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
            metadata: HashMap::new(),
            outputs: Vec::new(),
        }
    }

    /// Override the generated identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Record a handler output on this event.
    pub fn push_output(&mut self, handler: impl Into<String>, value: Value) {
        self.outputs.push(HandlerOutput::new(handler, value));
    }

    /// Return the most recent output produced by `handler`, if any.
    pub fn output_of(&self, handler: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .rev()
            .find(|o| o.handler == handler)
            .map(|o| &o.value)
    }
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// A unit of behaviour invoked by the event loop for matching events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and in [`HandlerOutput::handler`].
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this handler accepts events of the given type.
    fn can_handle(&self, event_type: &EventType) -> bool;

    /// Process one event.  Errors are logged by the loop and never stop
    /// sibling handlers or the loop itself.
    async fn handle(&self, ctx: &HandlerContext, event: &mut Event) -> HandlerResult;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Messages, message handlers, and a bounded message queue.
//!
//! A [`Message`] is routed by the [`MessageRouter`](crate::MessageRouter) to
//! every handler registered for its [`MessageType`], in ascending
//! [`MessageHandler::priority`] order.  Unlike events, messages carry explicit
//! source and target labels and are dispatched on the caller's task.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::{HandlerContext, HandlerOutput, HandlerResult};
use crate::error::{KernelError, Result};

/// Priority given to handlers that do not override
/// [`MessageHandler::priority`].
pub const DEFAULT_PRIORITY: i32 = 100;

// ---------------------------------------------------------------------------
// Message type tag
// ---------------------------------------------------------------------------

/// Type tag of a message.  An open set, like
/// [`EventType`](crate::EventType).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(Cow<'static, str>);

impl MessageType {
    pub const USER_INPUT: Self = Self(Cow::Borrowed("user_input"));
    pub const SYSTEM_EVENT: Self = Self(Cow::Borrowed("system_event"));
    pub const TOOL_RESPONSE: Self = Self(Cow::Borrowed("tool_response"));
    pub const AGENT_MESSAGE: Self = Self(Cow::Borrowed("agent_message"));
    pub const EXTERNAL_EVENT: Self = Self(Cow::Borrowed("external_event"));
    pub const MEMORY_STORE: Self = Self(Cow::Borrowed("memory_store"));
    pub const MEMORY_GET: Self = Self(Cow::Borrowed("memory_get"));
    pub const MEMORY_DELETE: Self = Self(Cow::Borrowed("memory_delete"));

    /// Create a type tag from an arbitrary string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The built-in message types every router knows about.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::USER_INPUT,
            Self::SYSTEM_EVENT,
            Self::TOOL_RESPONSE,
            Self::AGENT_MESSAGE,
            Self::EXTERNAL_EVENT,
            Self::MEMORY_STORE,
            Self::MEMORY_GET,
            Self::MEMORY_DELETE,
        ]
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A routed unit of communication between system components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    /// Values attached by handlers while the message was routed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<HandlerOutput>,
}

impl Message {
    /// Create a message with a fresh time-ordered id and the current time.
    pub fn new(
        message_type: impl Into<MessageType>,
        source: impl Into<String>,
        target: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            message_type: message_type.into(),
            source: source.into(),
            target: target.into(),
            payload,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Record a handler output on this message.
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

/// A unit of behaviour invoked by the router for matching messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and in [`HandlerOutput::handler`].
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this handler accepts messages of the given type.
    fn can_handle(&self, message_type: &MessageType) -> bool;

    /// Lower numbers run first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Process one message.
    async fn handle(&self, ctx: &HandlerContext, message: &mut Message) -> HandlerResult;
}

// ---------------------------------------------------------------------------
// Message queue
// ---------------------------------------------------------------------------

/// Bounded FIFO of messages with a non-blocking producer side.
///
/// Closing the queue never closes the underlying channel while producers may
/// still hold a reference; instead a `closed` flag is checked on every
/// enqueue and a cancellation token wakes any waiting consumer.
pub struct MessageQueue {
    sender: mpsc::Sender<Message>,
    receiver: Mutex<mpsc::Receiver<Message>>,
    capacity: usize,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl MessageQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Add a message without waiting.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KernelError::QueueClosed);
        }

        self.sender.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => KernelError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => KernelError::QueueClosed,
        })
    }

    /// Wait for the next message.  Returns [`KernelError::QueueClosed`] once
    /// the queue has been closed; messages still buffered at that point are
    /// dropped.
    pub async fn dequeue(&self) -> Result<Message> {
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(KernelError::QueueClosed),
            next = receiver.recv() => next.ok_or(KernelError::QueueClosed),
        }
    }

    /// Close the queue.  Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("message queue closed");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered messages (always 0 once closed).
    pub fn len(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

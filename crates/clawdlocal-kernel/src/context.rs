//! Handler context and explicit handler outputs.
//!
//! Every handler invocation receives a [`HandlerContext`] carrying the
//! cancellation token of whoever drives the dispatch (the event loop, or the
//! caller of [`MessageRouter::route`](crate::MessageRouter::route)).
//!
//! Data produced by one handler for the benefit of later handlers, or of the
//! original producer, is appended to the item as a [`HandlerOutput`] rather
//! than stashed in an ambient, string-keyed side channel.

use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Error type returned by handlers.  Any `std::error::Error` converts into it
/// via `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by [`EventHandler::handle`](crate::EventHandler::handle)
/// and [`MessageHandler::handle`](crate::MessageHandler::handle).
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Cancellable context passed to handlers and tool functions.
///
/// Cloning is cheap; clones share the same cancellation state.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    cancel: CancellationToken,
}

impl HandlerContext {
    /// Create a fresh context that is never cancelled unless
    /// [`HandlerContext::cancel`] is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token.
    #[must_use]
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Derive a child context.  Cancelling the parent cancels the child, but
    /// not the other way around.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve once cancellation has been requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Access the underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A value produced by a handler and attached to the event or message it
/// processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutput {
    /// Name of the handler that produced the value.
    pub handler: String,
    /// The produced value.
    pub value: serde_json::Value,
}

impl HandlerOutput {
    pub fn new(handler: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            handler: handler.into(),
            value,
        }
    }
}

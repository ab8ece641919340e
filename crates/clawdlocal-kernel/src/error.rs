//! Kernel error types.
//!
//! All kernel subsystems surface errors through [`KernelError`], which is the
//! single error type returned by every public API in this crate.  Tool
//! lookups and tool failures are deliberately absent: those are reported
//! inside a [`ToolResult`](crate::ToolResult), never raised.

use crate::context::HandlerError;

/// Unified error type for the ClawdLocal kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Event loop errors --------------------------------------------------
    /// The event loop has not been started, or has been stopped.
    #[error("event loop is not running")]
    NotRunning,

    /// The bounded queue had no free slot when the emit was attempted.
    #[error("event queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    // -- Router errors ------------------------------------------------------
    /// No handler is registered for the routed message type.
    #[error("no handlers registered for message type: {message_type}")]
    NoHandlersForType { message_type: String },

    /// A handler returned an error while processing an event or message.
    #[error("handler `{handler}` failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: HandlerError,
    },

    // -- Message queue errors -----------------------------------------------
    /// The message queue has been closed and accepts no more messages.
    #[error("message queue is closed")]
    QueueClosed,

    // -- Registry errors ----------------------------------------------------
    /// A tool with the same name is already registered.
    #[error("tool already registered: {name}")]
    AlreadyRegistered { name: String },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;

//! ClawdLocal core runtime.
//!
//! This crate provides the coordination primitives of the local agent
//! runtime:
//!
//! - **[`event_loop`]** -- Single-consumer dispatch loop over a bounded FIFO
//!   queue.  Producers call [`EventLoop::emit`]; every matching
//!   [`EventHandler`] runs in registration order on the dispatch task.
//! - **[`router`]** -- Priority-ordered [`MessageRouter`] mapping a message
//!   type to the handlers that accept it.
//! - **[`tools`]** -- Name-keyed [`ToolRegistry`] whose execution path never
//!   fails past the [`ToolResult`] boundary.
//! - **[`event`]** / **[`message`]** -- The data units flowing through the
//!   loop and the router, plus their handler traits.
//! - **[`context`]** -- Cancellation context and explicit handler outputs.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! Every component is an explicit, cheaply cloneable instance; there are no
//! process-wide registries.

pub mod context;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod message;
pub mod router;
pub mod tools;

// Re-export the most commonly used types at the crate root for convenience.
pub use context::{HandlerContext, HandlerError, HandlerOutput, HandlerResult};
pub use error::{KernelError, Result};
pub use event::{Event, EventHandler, EventType};
pub use event_loop::EventLoop;
pub use message::{Message, MessageHandler, MessageQueue, MessageType};
pub use router::MessageRouter;
pub use tools::{Tool, ToolArgs, ToolCall, ToolDefinition, ToolError, ToolRegistry, ToolResult};

//! Built-in event and message handlers.
//!
//! - [`EchoHandler`] -- logs every routed message and echoes it as an output.
//! - [`LoggingEventHandler`] -- logs events of a configurable set of types.
//! - [`ToolCallEventHandler`] / [`ToolCallMessageHandler`] -- run a tool
//!   through the [`ToolRegistry`](clawdlocal_kernel::ToolRegistry) and attach
//!   the [`ToolResult`](clawdlocal_kernel::ToolResult).
//! - [`MemoryEventHandler`] / [`MemoryMessageHandler`] -- store, query and
//!   delete memory entries.
//!
//! Handlers never communicate through shared ambient state: whatever they
//! produce is appended to the item's `outputs` list under the handler name.

pub mod echo;
pub mod logging;
pub mod memory;
pub mod tool_call;

pub use echo::EchoHandler;
pub use logging::LoggingEventHandler;
pub use memory::{MemoryEventHandler, MemoryMessageHandler, MemoryRequest};
pub use tool_call::{ToolCallEventHandler, ToolCallMessageHandler, ToolCallRequest};

//! HTTP interface for ClawdLocal.
//!
//! This crate exposes a running [`Agent`](clawdlocal_agent::Agent) over a
//! JSON REST API:
//!
//! - Event submission into the event loop.
//! - Message routing through the priority router.
//! - Short-term and long-term memory listing, writes, deletes and search.
//! - Tool discovery and execution.
//! - Agent info and a liveness check.
//!
//! When the configured static directory exists it is served under
//! `/static`, with its `index.html` at `/`.

pub mod api;
pub mod server;
pub mod state;

pub use server::WebServer;
pub use state::AppState;

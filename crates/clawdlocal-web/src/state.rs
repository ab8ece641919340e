//! Shared application state for the web server.

use clawdlocal_agent::Agent;

/// Shared state accessible from every Axum handler.
///
/// The [`Agent`] is itself a cheap handle, so the state is cloned per
/// request rather than wrapped in another `Arc`.
#[derive(Clone, Debug)]
pub struct AppState {
    pub agent: Agent,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }
}

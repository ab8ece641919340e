//! The agent runtime: one instance owns every component.
//!
//! [`Agent::new`] builds the tool registry, memory manager, event loop and
//! message router from a [`Config`] and wires the built-in tools and
//! handlers into them.  [`Agent::start`] launches the event loop consumer
//! and the memory cleanup sweep; [`Agent::shutdown`] stops both and waits
//! for them to exit.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use clawdlocal_kernel::{
    Event, EventLoop, HandlerContext, Message, MessageRouter, ToolCall, ToolRegistry, ToolResult,
};
use clawdlocal_store::MemoryManager;
use serde::Serialize;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::handlers::{
    EchoHandler, LoggingEventHandler, MemoryEventHandler, MemoryMessageHandler,
    ToolCallEventHandler, ToolCallMessageHandler,
};
use crate::memory::{MemoryAccess, MemoryTier};

/// Snapshot returned by [`Agent::info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub workspace: PathBuf,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub tools: usize,
    pub queue_len: usize,
    pub queue_capacity: usize,
}

/// A running (or runnable) ClawdLocal agent.
///
/// Cheaply cloneable; clones share the same components.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    config: Config,
    tools: ToolRegistry,
    memory: MemoryAccess,
    event_loop: EventLoop,
    router: MessageRouter,
    sweep: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

impl Agent {
    /// Build every component and register the built-in tools and handlers.
    ///
    /// Fails if the long-term memory file exists but cannot be read.
    pub fn new(config: Config) -> Result<Self> {
        let tools = ToolRegistry::new();
        clawdlocal_adapters::register_builtin_tools(&tools, &config.agent.workspace)?;

        let manager = MemoryManager::new(config.memory_config())?;
        let memory = MemoryAccess::new(manager, &config.memory);

        let event_loop = EventLoop::new(config.agent.max_queue_size);
        event_loop.register_handler(Arc::new(LoggingEventHandler::default()));
        event_loop.register_handler(Arc::new(ToolCallEventHandler::new(tools.clone())));
        event_loop.register_handler(Arc::new(MemoryEventHandler::new(memory.clone())));

        let router = MessageRouter::new();
        router.register_handler(Arc::new(EchoHandler));
        router.register_handler(Arc::new(ToolCallMessageHandler::new(tools.clone())));
        router.register_handler(Arc::new(MemoryMessageHandler::new(memory.clone())));

        info!(
            name = %config.agent.name,
            version = %config.agent.version,
            workspace = %config.agent.workspace.display(),
            tools = tools.len(),
            "agent initialised"
        );

        Ok(Self {
            inner: Arc::new(AgentInner {
                config,
                tools,
                memory,
                event_loop,
                router,
                sweep: Mutex::new(None),
                started_at: RwLock::new(None),
            }),
        })
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Start the event loop and, when the short-term tier is enabled, the
    /// memory cleanup sweep.  Starting a running agent is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut sweep = self.inner.sweep.lock().await;
        if self.is_running() {
            return Ok(());
        }

        self.inner.event_loop.start().await?;

        if self.inner.memory.is_enabled(MemoryTier::ShortTerm) {
            let token = CancellationToken::new();
            let handle = self.inner.memory.manager().spawn_cleanup(token.clone());
            *sweep = Some((token, handle));
        }

        *self
            .inner
            .started_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        info!(name = %self.inner.config.agent.name, "agent started");
        Ok(())
    }

    /// Stop the cleanup sweep and the event loop and wait for both.
    pub async fn shutdown(&self) {
        let mut sweep = self.inner.sweep.lock().await;
        if let Some((token, handle)) = sweep.take() {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "memory cleanup task failed");
            }
        }

        self.inner.event_loop.stop().await;
        *self
            .inner
            .started_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        info!(name = %self.inner.config.agent.name, "agent stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.event_loop.is_running()
    }

    // -- Operations ----------------------------------------------------------

    /// Queue an event for the event loop.
    pub fn emit(&self, event: Event) -> Result<()> {
        Ok(self.inner.event_loop.emit(event)?)
    }

    /// Queue an event and receive it back once every handler has run.
    pub fn emit_with_reply(&self, event: Event) -> Result<oneshot::Receiver<Event>> {
        Ok(self.inner.event_loop.emit_with_reply(event)?)
    }

    /// Route a message through every matching handler.  Outputs are
    /// appended to `message`, including those of handlers that ran before
    /// or after a failing one.
    pub async fn route_message(&self, message: &mut Message) -> Result<()> {
        self.inner
            .router
            .route(&HandlerContext::new(), message)
            .await?;
        Ok(())
    }

    /// Run one tool call.  Never fails; errors are carried in the result.
    pub async fn execute_tool(&self, call: ToolCall) -> ToolResult {
        self.inner
            .tools
            .execute_tool(&HandlerContext::new(), call)
            .await
    }

    pub fn info(&self) -> AgentInfo {
        let agent = &self.inner.config.agent;
        let started_at = *self
            .inner
            .started_at
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let uptime_secs = started_at
            .and_then(|t| (Utc::now() - t).to_std().ok())
            .map_or(0, |d| d.as_secs());

        AgentInfo {
            name: agent.name.clone(),
            version: agent.version.clone(),
            description: agent.description.clone(),
            workspace: agent.workspace.clone(),
            running: self.is_running(),
            started_at,
            uptime_secs,
            tools: self.inner.tools.len(),
            queue_len: self.inner.event_loop.queue_len(),
            queue_capacity: self.inner.event_loop.capacity(),
        }
    }

    // -- Accessors -----------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    pub fn memory(&self) -> &MemoryAccess {
        &self.inner.memory
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    pub fn router(&self) -> &MessageRouter {
        &self.inner.router
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.inner.config.agent.name)
            .field("running", &self.is_running())
            .field("tools", &self.inner.tools.len())
            .finish_non_exhaustive()
    }
}

//! Logging handler for lifecycle-style events.

use std::collections::HashSet;

use async_trait::async_trait;
use clawdlocal_kernel::{Event, EventHandler, EventType, HandlerContext, HandlerResult};
use tracing::info;

/// Logs every event whose type is in its set.  Produces no output.
#[derive(Debug, Clone)]
pub struct LoggingEventHandler {
    types: HashSet<EventType>,
}

impl LoggingEventHandler {
    pub const NAME: &'static str = "logging";

    pub fn new(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl Default for LoggingEventHandler {
    /// `system`, `heartbeat` and `message` events.
    fn default() -> Self {
        Self::new([EventType::SYSTEM, EventType::HEARTBEAT, EventType::MESSAGE])
    }
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, event_type: &EventType) -> bool {
        self.types.contains(event_type)
    }

    async fn handle(&self, _ctx: &HandlerContext, event: &mut Event) -> HandlerResult {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            timestamp = %event.timestamp,
            data = %event.data,
            "event received"
        );
        Ok(())
    }
}

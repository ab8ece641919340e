//! Echo handler: accepts every message type at low priority.

use async_trait::async_trait;
use clawdlocal_kernel::{HandlerContext, HandlerResult, Message, MessageHandler, MessageType};
use serde_json::json;
use tracing::info;

/// Priority of [`EchoHandler`]; runs before the default-priority handlers.
pub const ECHO_PRIORITY: i32 = 50;

#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl EchoHandler {
    pub const NAME: &'static str = "echo";
}

#[async_trait]
impl MessageHandler for EchoHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, _message_type: &MessageType) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        ECHO_PRIORITY
    }

    async fn handle(&self, _ctx: &HandlerContext, message: &mut Message) -> HandlerResult {
        info!(
            message_id = %message.id,
            message_type = %message.message_type,
            source = %message.source,
            target = %message.target,
            "echo"
        );
        let echoed = json!({
            "type": message.message_type,
            "source": message.source,
            "target": message.target,
            "payload": message.payload,
        });
        message.push_output(Self::NAME, echoed);
        Ok(())
    }
}

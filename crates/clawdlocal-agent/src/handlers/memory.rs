//! Memory handlers.
//!
//! Payload shape shared by events and messages:
//!
//! ```json
//! { "key": "user_name", "value": "Ada", "ttl": 60, "tier": "short_term" }
//! ```
//!
//! `value` is required for stores only.  `ttl` is seconds (or a duration
//! string such as `"5m"`) and only affects the short-term tier.  `tier`
//! defaults to `short_term` for events and `long_term` for messages.

use std::time::Duration;

use async_trait::async_trait;
use clawdlocal_kernel::{
    Event, EventHandler, EventType, HandlerContext, HandlerResult, Message, MessageHandler,
    MessageType,
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::parse_duration;
use crate::error::{AgentError, Result};
use crate::memory::{MemoryAccess, MemoryTier};

/// Priority of [`MemoryMessageHandler`].
pub const MEMORY_PRIORITY: i32 = 150;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRequest {
    pub key: String,
    pub value: Option<Value>,
    pub ttl: Option<Duration>,
    pub tier: MemoryTier,
}

impl MemoryRequest {
    pub fn from_payload(payload: &Value, default_tier: MemoryTier) -> Result<Self> {
        let obj = payload
            .as_object()
            .ok_or_else(|| AgentError::Payload("memory payload must be an object".into()))?;

        let key = obj
            .get("key")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::Payload("memory payload is missing 'key'".into()))?
            .to_owned();

        let tier = match obj.get("tier").and_then(Value::as_str) {
            Some(tier) => tier.parse()?,
            None => default_tier,
        };

        let ttl = match obj.get("ttl") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => {
                let secs = n
                    .as_f64()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .ok_or_else(|| AgentError::Payload(format!("invalid ttl `{n}`")))?;
                Some(Duration::from_secs_f64(secs))
            }
            Some(Value::String(s)) => Some(parse_duration(s).map_err(AgentError::Payload)?),
            Some(other) => return Err(AgentError::Payload(format!("invalid ttl `{other}`"))),
        };

        Ok(Self {
            key,
            value: obj.get("value").cloned(),
            ttl,
            tier,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryOp {
    Store,
    Get,
    Delete,
}

async fn apply(access: &MemoryAccess, op: MemoryOp, req: MemoryRequest) -> Result<Value> {
    let MemoryRequest {
        key,
        value,
        ttl,
        tier,
    } = req;

    match op {
        MemoryOp::Store => {
            let value = value
                .ok_or_else(|| AgentError::Payload("memory store requires a 'value'".into()))?;
            access.store(tier, &key, value, ttl).await?;
            info!(key = %key, tier = %tier, "memory stored");
            Ok(json!({ "key": key, "tier": tier, "stored": true }))
        }
        MemoryOp::Get => {
            let value = access.get(tier, &key)?;
            debug!(key = %key, tier = %tier, found = value.is_some(), "memory queried");
            Ok(json!({
                "key": key,
                "tier": tier,
                "found": value.is_some(),
                "value": value,
            }))
        }
        MemoryOp::Delete => {
            let deleted = access.delete(tier, &key).await?;
            info!(key = %key, tier = %tier, deleted, "memory deleted");
            Ok(json!({ "key": key, "tier": tier, "deleted": deleted }))
        }
    }
}

// ---------------------------------------------------------------------------
// Event handler
// ---------------------------------------------------------------------------

/// Handles `memory_store`, `memory_query` and `memory_delete` events.
#[derive(Debug, Clone)]
pub struct MemoryEventHandler {
    access: MemoryAccess,
}

impl MemoryEventHandler {
    pub const NAME: &'static str = "memory";

    pub fn new(access: MemoryAccess) -> Self {
        Self { access }
    }

    fn op_for(event_type: &EventType) -> Option<MemoryOp> {
        if *event_type == EventType::MEMORY_STORE {
            Some(MemoryOp::Store)
        } else if *event_type == EventType::MEMORY_QUERY {
            Some(MemoryOp::Get)
        } else if *event_type == EventType::MEMORY_DELETE {
            Some(MemoryOp::Delete)
        } else {
            None
        }
    }
}

#[async_trait]
impl EventHandler for MemoryEventHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, event_type: &EventType) -> bool {
        Self::op_for(event_type).is_some()
    }

    async fn handle(&self, _ctx: &HandlerContext, event: &mut Event) -> HandlerResult {
        let op = Self::op_for(&event.event_type).ok_or_else(|| {
            AgentError::Payload(format!("unsupported event type `{}`", event.event_type))
        })?;
        let req = MemoryRequest::from_payload(&event.data, MemoryTier::ShortTerm)?;
        let output = apply(&self.access, op, req).await?;
        event.push_output(Self::NAME, output);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message handler
// ---------------------------------------------------------------------------

/// Handles `memory_store`, `memory_get` and `memory_delete` messages.
#[derive(Debug, Clone)]
pub struct MemoryMessageHandler {
    access: MemoryAccess,
}

impl MemoryMessageHandler {
    pub const NAME: &'static str = "memory";

    pub fn new(access: MemoryAccess) -> Self {
        Self { access }
    }

    fn op_for(message_type: &MessageType) -> Option<MemoryOp> {
        if *message_type == MessageType::MEMORY_STORE {
            Some(MemoryOp::Store)
        } else if *message_type == MessageType::MEMORY_GET {
            Some(MemoryOp::Get)
        } else if *message_type == MessageType::MEMORY_DELETE {
            Some(MemoryOp::Delete)
        } else {
            None
        }
    }
}

#[async_trait]
impl MessageHandler for MemoryMessageHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, message_type: &MessageType) -> bool {
        Self::op_for(message_type).is_some()
    }

    fn priority(&self) -> i32 {
        MEMORY_PRIORITY
    }

    async fn handle(&self, _ctx: &HandlerContext, message: &mut Message) -> HandlerResult {
        let op = Self::op_for(&message.message_type).ok_or_else(|| {
            AgentError::Payload(format!("unsupported message type `{}`", message.message_type))
        })?;
        let req = MemoryRequest::from_payload(&message.payload, MemoryTier::LongTerm)?;
        let output = apply(&self.access, op, req).await?;
        message.push_output(Self::NAME, output);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;
    use clawdlocal_store::{MemoryConfig, MemoryManager};

    fn access(dir: &tempfile::TempDir) -> MemoryAccess {
        let manager =
            MemoryManager::new(MemoryConfig::new(dir.path().join("long_term.json"))).unwrap();
        MemoryAccess::new(manager, &MemorySettings::default())
    }

    #[test]
    fn payload_parsing() {
        let req = MemoryRequest::from_payload(
            &json!({"key": "k", "value": 1, "ttl": 1.5}),
            MemoryTier::ShortTerm,
        )
        .unwrap();
        assert_eq!(req.ttl, Some(Duration::from_millis(1500)));
        assert_eq!(req.tier, MemoryTier::ShortTerm);

        let req =
            MemoryRequest::from_payload(&json!({"key": "k", "ttl": "5m", "tier": "long_term"}), MemoryTier::ShortTerm)
                .unwrap();
        assert_eq!(req.ttl, Some(Duration::from_secs(300)));
        assert_eq!(req.tier, MemoryTier::LongTerm);

        assert!(MemoryRequest::from_payload(&json!({"value": 1}), MemoryTier::ShortTerm).is_err());
        assert!(MemoryRequest::from_payload(&json!({"key": "k", "ttl": -1}), MemoryTier::ShortTerm).is_err());
    }

    #[tokio::test]
    async fn event_store_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let handler = MemoryEventHandler::new(access(&dir));
        let ctx = HandlerContext::new();

        let mut store = Event::new(EventType::MEMORY_STORE, json!({"key": "mood", "value": "curious"}));
        handler.handle(&ctx, &mut store).await.unwrap();
        assert_eq!(store.output_of("memory").unwrap()["tier"], "short_term");

        let mut query = Event::new(EventType::MEMORY_QUERY, json!({"key": "mood"}));
        handler.handle(&ctx, &mut query).await.unwrap();
        let out = query.output_of("memory").unwrap();
        assert_eq!(out["found"], true);
        assert_eq!(out["value"], "curious");
    }

    #[tokio::test]
    async fn store_without_value_fails() {
        let dir = tempfile::tempdir().unwrap();
        let handler = MemoryEventHandler::new(access(&dir));
        let mut event = Event::new(EventType::MEMORY_STORE, json!({"key": "k"}));
        let err = handler.handle(&HandlerContext::new(), &mut event).await.unwrap_err();
        assert!(err.to_string().contains("value"));
        assert!(event.outputs.is_empty());
    }

    #[tokio::test]
    async fn message_get_of_missing_key_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handler = MemoryMessageHandler::new(access(&dir));
        let mut message = Message::new(MessageType::MEMORY_GET, "test", "agent", json!({"key": "nope"}));
        handler.handle(&HandlerContext::new(), &mut message).await.unwrap();

        let out = message.output_of("memory").unwrap();
        assert_eq!(out["found"], false);
        assert_eq!(out["tier"], "long_term");
        assert!(out["value"].is_null());
    }

    #[tokio::test]
    async fn message_store_defaults_to_long_term() {
        let dir = tempfile::tempdir().unwrap();
        let access = access(&dir);
        let handler = MemoryMessageHandler::new(access.clone());
        let mut message = Message::new(
            MessageType::MEMORY_STORE,
            "test",
            "agent",
            json!({"key": "fact", "value": 42}),
        );
        handler.handle(&HandlerContext::new(), &mut message).await.unwrap();

        assert_eq!(access.manager().get_long_term("fact"), Some(json!(42)));
        assert_eq!(access.manager().get_short_term("fact"), None);
    }
}

//! Integration tests for the clawdlocal-kernel crate.
//!
//! These tests exercise the event loop, message router, and tool registry
//! through their public APIs only.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clawdlocal_kernel::{
    Event, EventHandler, EventLoop, EventType, HandlerContext, HandlerResult, KernelError,
    Message, MessageHandler, MessageRouter, MessageType, Tool, ToolArgs, ToolCall, ToolError,
    ToolRegistry,
};
use serde_json::{Value, json};
use tokio::sync::Notify;

// ═══════════════════════════════════════════════════════════════════════
//  Test handlers
// ═══════════════════════════════════════════════════════════════════════

/// Blocks on every event until released or cancelled.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl EventHandler for Gate {
    fn can_handle(&self, _event_type: &EventType) -> bool {
        true
    }

    async fn handle(&self, ctx: &HandlerContext, _event: &mut Event) -> HandlerResult {
        self.entered.notify_one();
        tokio::select! {
            () = self.release.notified() => {}
            () = ctx.cancelled() => {}
        }
        Ok(())
    }
}

/// Appends `data.n` of every event to a shared log.
struct Recorder {
    name: &'static str,
    seen: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl EventHandler for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn can_handle(&self, event_type: &EventType) -> bool {
        *event_type == EventType::MESSAGE
    }

    async fn handle(&self, _ctx: &HandlerContext, event: &mut Event) -> HandlerResult {
        let n = event.data["n"].as_i64().unwrap_or(-1);
        self.seen.lock().unwrap().push(n);
        event.push_output(self.name, json!(n));
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl EventHandler for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn can_handle(&self, event_type: &EventType) -> bool {
        *event_type == EventType::MESSAGE
    }

    async fn handle(&self, _ctx: &HandlerContext, _event: &mut Event) -> HandlerResult {
        Err("handler exploded".into())
    }
}

struct Ordered {
    name: &'static str,
    priority: i32,
}

#[async_trait]
impl MessageHandler for Ordered {
    fn name(&self) -> &str {
        self.name
    }

    fn can_handle(&self, message_type: &MessageType) -> bool {
        *message_type == MessageType::AGENT_MESSAGE
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle(&self, _ctx: &HandlerContext, message: &mut Message) -> HandlerResult {
        message.push_output(self.name, json!(self.priority));
        Ok(())
    }
}

fn numbered(n: i64) -> Event {
    Event::new(EventType::MESSAGE, json!({ "n": n }))
}

// ═══════════════════════════════════════════════════════════════════════
//  Event loop
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn emit_beyond_capacity_fails_with_queue_full() {
    let capacity = 3;
    let event_loop = EventLoop::new(capacity);
    let entered = Arc::new(Notify::new());
    event_loop.register_handler(Arc::new(Gate {
        entered: Arc::clone(&entered),
        release: Arc::new(Notify::new()),
    }));
    event_loop.start().await.unwrap();

    // Park the consumer inside the first event.
    event_loop.emit(Event::new(EventType::SYSTEM, Value::Null)).unwrap();
    tokio::time::timeout(Duration::from_secs(2), entered.notified())
        .await
        .unwrap();

    for _ in 0..capacity {
        event_loop.emit(Event::new(EventType::SYSTEM, Value::Null)).unwrap();
    }
    assert_eq!(event_loop.queue_len(), capacity);

    let overflow = event_loop.emit(Event::new(EventType::SYSTEM, Value::Null));
    assert!(matches!(overflow, Err(KernelError::QueueFull { capacity: 3 })));

    event_loop.stop().await;
    assert_eq!(event_loop.queue_len(), 0);
}

#[tokio::test]
async fn events_are_dispatched_in_fifo_order() {
    let event_loop = EventLoop::new(64);
    let seen = Arc::new(Mutex::new(Vec::new()));
    event_loop.register_handler(Arc::new(Recorder {
        name: "recorder",
        seen: Arc::clone(&seen),
    }));
    event_loop.start().await.unwrap();

    for n in 0..20 {
        event_loop.emit(numbered(n)).unwrap();
    }
    let last = event_loop.emit_with_reply(numbered(20)).unwrap();
    last.await.unwrap();

    let expected: Vec<i64> = (0..=20).collect();
    assert_eq!(*seen.lock().unwrap(), expected);

    event_loop.stop().await;
}

#[tokio::test]
async fn handler_error_does_not_stop_siblings_or_loop() {
    let event_loop = EventLoop::new(8);
    let seen = Arc::new(Mutex::new(Vec::new()));
    event_loop.register_handler(Arc::new(Failing));
    event_loop.register_handler(Arc::new(Recorder {
        name: "after_failure",
        seen: Arc::clone(&seen),
    }));
    event_loop.start().await.unwrap();

    let first = event_loop.emit_with_reply(numbered(1)).unwrap().await.unwrap();
    assert_eq!(first.output_of("after_failure"), Some(&json!(1)));

    let second = event_loop.emit_with_reply(numbered(2)).unwrap().await.unwrap();
    assert_eq!(second.output_of("after_failure"), Some(&json!(2)));
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

    event_loop.stop().await;
}

#[tokio::test]
async fn unhandled_event_is_consumed_without_error() {
    let event_loop = EventLoop::new(4);
    event_loop.start().await.unwrap();

    let processed = event_loop
        .emit_with_reply(Event::new("nobody_listens", json!({"x": 1})))
        .unwrap()
        .await
        .unwrap();

    assert!(processed.outputs.is_empty());
    assert_eq!(event_loop.queue_len(), 0);
    assert!(event_loop.is_running());

    event_loop.stop().await;
}

#[tokio::test]
async fn emit_after_stop_fails_with_not_running() {
    let event_loop = EventLoop::new(4);
    event_loop.start().await.unwrap();
    event_loop.stop().await;

    let result = event_loop.emit(Event::new(EventType::SYSTEM, Value::Null));
    assert!(matches!(result, Err(KernelError::NotRunning)));
}

#[tokio::test]
async fn stop_waits_for_in_flight_dispatch_and_drops_pending() {
    let event_loop = EventLoop::new(4);
    let entered = Arc::new(Notify::new());
    event_loop.register_handler(Arc::new(Gate {
        entered: Arc::clone(&entered),
        release: Arc::new(Notify::new()),
    }));
    event_loop.start().await.unwrap();

    let in_flight = event_loop
        .emit_with_reply(Event::new(EventType::SYSTEM, Value::Null))
        .unwrap();
    entered.notified().await;
    let pending = event_loop
        .emit_with_reply(Event::new(EventType::SYSTEM, Value::Null))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), event_loop.stop())
        .await
        .unwrap();

    // The in-flight event finished; the queued one was dropped unprocessed.
    assert!(in_flight.await.is_ok());
    assert!(pending.await.is_err());
}

#[tokio::test]
async fn handlers_registered_while_running_see_later_events() {
    let event_loop = EventLoop::new(8);
    event_loop.start().await.unwrap();

    let before = event_loop.emit_with_reply(numbered(1)).unwrap().await.unwrap();
    assert!(before.outputs.is_empty());

    event_loop.register_handler(Arc::new(Recorder {
        name: "late",
        seen: Arc::new(Mutex::new(Vec::new())),
    }));
    assert_eq!(event_loop.handler_count(), 1);

    let after = event_loop.emit_with_reply(numbered(2)).unwrap().await.unwrap();
    assert_eq!(after.output_of("late"), Some(&json!(2)));

    event_loop.stop().await;
}

// ═══════════════════════════════════════════════════════════════════════
//  Message router
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn router_runs_priority_ten_before_fifty() {
    let router = MessageRouter::new();
    router.register_handler(Arc::new(Ordered {
        name: "fifty",
        priority: 50,
    }));
    router.register_handler(Arc::new(Ordered {
        name: "ten",
        priority: 10,
    }));

    let mut message = Message::new(MessageType::AGENT_MESSAGE, "a", "b", Value::Null);
    router
        .route(&HandlerContext::new(), &mut message)
        .await
        .unwrap();

    let order: Vec<_> = message.outputs.iter().map(|o| o.handler.as_str()).collect();
    assert_eq!(order, vec!["ten", "fifty"]);
}

#[tokio::test]
async fn router_get_handlers_is_defensive_copy() {
    let router = MessageRouter::new();
    router.register_handler(Arc::new(Ordered {
        name: "one",
        priority: 1,
    }));

    let mut handlers = router.get_handlers(&MessageType::AGENT_MESSAGE);
    handlers.pop();
    handlers.push(Arc::new(Ordered {
        name: "intruder",
        priority: 0,
    }));

    let current = router.get_handlers(&MessageType::AGENT_MESSAGE);
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].name(), "one");
}

// ═══════════════════════════════════════════════════════════════════════
//  Tool registry
// ═══════════════════════════════════════════════════════════════════════

fn adder() -> Tool {
    Tool::new(
        "add",
        "Add two integers",
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer" },
                "b": { "type": "integer" }
            },
            "required": ["a", "b"]
        }),
        |_ctx, args: ToolArgs| async move {
            let a = args.get("a").and_then(Value::as_i64).ok_or("missing a")?;
            let b = args.get("b").and_then(Value::as_i64).ok_or("missing b")?;
            Ok::<Value, ToolError>(json!(a + b))
        },
    )
}

#[test]
fn duplicate_tool_registration_is_rejected() {
    let registry = ToolRegistry::new();
    registry.register_tool(adder()).unwrap();

    let err = registry.register_tool(adder()).unwrap_err();
    assert!(matches!(err, KernelError::AlreadyRegistered { ref name } if name == "add"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn missing_tool_returns_error_result() {
    let registry = ToolRegistry::new();
    let call = ToolCall::new("missing", ToolArgs::new());
    let call_id = call.id.clone();

    let result = registry.execute_tool(&HandlerContext::new(), call).await;
    assert_eq!(result.id, call_id);
    assert_eq!(result.name, "missing");
    assert!(!result.error.is_empty());
    assert!(result.result.is_none());
}

#[tokio::test]
async fn valid_tool_call_returns_result() {
    let registry = ToolRegistry::new();
    registry.register_tool(adder()).unwrap();

    let mut args = ToolArgs::new();
    args.insert("a".into(), json!(2));
    args.insert("b".into(), json!(40));

    let result = registry
        .execute_tool(&HandlerContext::new(), ToolCall::new("add", args))
        .await;
    assert!(result.is_ok());
    assert_eq!(result.error, "");
    assert_eq!(result.result, Some(json!(42)));
}

#[tokio::test]
async fn long_running_tool_does_not_block_registration() {
    let registry = ToolRegistry::new();
    let release = Arc::new(Notify::new());
    let gate = Arc::clone(&release);
    registry
        .register_tool(Tool::new("wait", "", Value::Null, move |_ctx, _args| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok::<Value, ToolError>(json!("done"))
            }
        }))
        .unwrap();

    let running = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .execute_tool(&HandlerContext::new(), ToolCall::new("wait", ToolArgs::new()))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    registry.register_tool(adder()).unwrap();
    assert!(registry.get_tool("add").is_some());

    release.notify_one();
    let result = running.await.unwrap();
    assert_eq!(result.result, Some(json!("done")));
}

//! Integration tests for the clawdlocal-web crate.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; no
//! socket is opened except in the serve test.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use clawdlocal_agent::{Agent, Config};
use clawdlocal_kernel::{Event, EventHandler, EventType, HandlerContext, HandlerResult};
use clawdlocal_web::WebServer;
use serde_json::{Value, json};
use tokio::sync::{Notify, Semaphore};
use tower::ServiceExt;

struct Harness {
    _dir: tempfile::TempDir,
    agent: Agent,
    router: Router,
}

fn harness_with(configure: impl FnOnce(&mut Config, &std::path::Path)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.agent.workspace = dir.path().join("workspace");
    config.memory.long_term.storage_dir = dir.path().join("memory");
    config.web.static_dir = dir.path().join("static");
    configure(&mut config, dir.path());
    std::fs::create_dir_all(&config.agent.workspace).unwrap();

    let agent = Agent::new(config).unwrap();
    let router = WebServer::new(agent.clone()).router();
    Harness {
        _dir: dir,
        agent,
        router,
    }
}

fn harness() -> Harness {
    harness_with(|_, _| {})
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

// ═══════════════════════════════════════════════════════════════════════
//  Health and agent info
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_reports_version() {
    let h = harness();
    let (status, body) = send(&h.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], "0.1.0");
}

#[tokio::test]
async fn agent_info_reflects_config() {
    let h = harness();
    let (status, body) = send(&h.router, Method::GET, "/api/v1/agent", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "ClawdLocal");
    assert_eq!(body["running"], false);
    assert_eq!(body["tools"], 4);
}

// ═══════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn events_are_rejected_while_stopped() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        Method::POST,
        "/api/v1/events",
        Some(json!({"type": "system", "data": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("not running"));
}

#[tokio::test]
async fn events_are_accepted_with_an_assigned_id() {
    let h = harness();
    h.agent.start().await.unwrap();

    let (status, body) = send(
        &h.router,
        Method::POST,
        "/api/v1/events",
        Some(json!({"type": "memory_store", "data": {"key": "via_http", "value": 1}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!body["id"].as_str().unwrap().is_empty());
    assert_eq!(body["type"], "memory_store");

    h.agent.shutdown().await;
}

/// Holds the consumer inside `handle` until released.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Semaphore>,
}

#[async_trait]
impl EventHandler for Gate {
    fn can_handle(&self, event_type: &EventType) -> bool {
        event_type.as_str() == "gate"
    }

    async fn handle(&self, _ctx: &HandlerContext, _event: &mut Event) -> HandlerResult {
        self.entered.notify_one();
        let _permit = self.release.acquire().await;
        Ok(())
    }
}

#[tokio::test]
async fn full_queue_is_service_unavailable() {
    let h = harness_with(|config, _| config.agent.max_queue_size = 1);
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Semaphore::new(0));
    h.agent.event_loop().register_handler(Arc::new(Gate {
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    }));
    h.agent.start().await.unwrap();

    let gate = Some(json!({"type": "gate"}));
    let (status, _) = send(&h.router, Method::POST, "/api/v1/events", gate.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    entered.notified().await;

    // The consumer is parked; one more fills the queue.
    let (status, _) = send(&h.router, Method::POST, "/api/v1/events", gate.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&h.router, Method::POST, "/api/v1/events", gate).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("full"));

    release.add_permits(8);
    h.agent.shutdown().await;
}

// ═══════════════════════════════════════════════════════════════════════
//  Messages
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn messages_return_handler_outputs() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        Method::POST,
        "/api/v1/messages",
        Some(json!({"type": "memory_get", "payload": {"key": "absent"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "web");

    let outputs = body["outputs"].as_array().unwrap();
    assert_eq!(outputs[0]["handler"], "echo");
    assert_eq!(outputs[1]["handler"], "memory");
    assert_eq!(outputs[1]["value"]["found"], false);
}

#[tokio::test]
async fn unknown_message_type_is_not_found() {
    let h = harness();
    let (status, _) = send(
        &h.router,
        Method::POST,
        "/api/v1/messages",
        Some(json!({"type": "nobody_listens"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failing_handler_is_unprocessable() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        Method::POST,
        "/api/v1/messages",
        Some(json!({"type": "memory_store", "payload": {"key": "no_value_given"}})),
    )
    .await;
    // The memory handler rejects a store without a value.
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("memory"));

    // The echo handler ran first and its output survives the failure.
    let outputs = body["message"]["outputs"].as_array().unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0]["handler"], "echo");
}

// ═══════════════════════════════════════════════════════════════════════
//  Memory
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn memory_write_list_and_delete() {
    let h = harness();

    let (status, _) = send(
        &h.router,
        Method::POST,
        "/api/v1/memory/short",
        Some(json!({"key": "session", "value": "abc", "ttl": 60})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &h.router,
        Method::POST,
        "/api/v1/memory/long",
        Some(json!({"key": "owner", "value": {"name": "Ada"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, short) = send(&h.router, Method::GET, "/api/v1/memory/short", None).await;
    assert_eq!(short[0]["key"], "session");
    assert_eq!(short[0]["ttl_ms"], 60_000);

    let (_, long) = send(&h.router, Method::GET, "/api/v1/memory/long", None).await;
    assert_eq!(long[0]["value"]["name"], "Ada");

    let (_, found) = send(&h.router, Method::GET, "/api/v1/memory/search?q=ADA&long_term=true", None).await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let (_, stats) = send(&h.router, Method::GET, "/api/v1/memory/stats", None).await;
    assert_eq!(stats["short_term_count"], 1);
    assert_eq!(stats["long_term_count"], 1);

    let (status, _) = send(&h.router, Method::DELETE, "/api/v1/memory/long/owner", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&h.router, Method::DELETE, "/api/v1/memory/long/owner", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disabled_tier_is_forbidden() {
    let h = harness_with(|config, _| config.memory.short_term.enabled = false);
    let (status, _) = send(&h.router, Method::GET, "/api/v1/memory/short", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn empty_memory_key_is_bad_request() {
    let h = harness();
    let (status, _) = send(
        &h.router,
        Method::POST,
        "/api/v1/memory/long",
        Some(json!({"key": "", "value": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ═══════════════════════════════════════════════════════════════════════
//  Tools
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn tools_are_listed_with_schemas() {
    let h = harness();
    let (status, body) = send(&h.router, Method::GET, "/api/v1/tools", None).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["file_list", "file_read", "file_write", "network_request"]);
    assert_eq!(body[1]["parameters"]["required"][0], "filepath");
}

#[tokio::test]
async fn tool_execution_always_returns_ok() {
    let h = harness();

    let (status, body) = send(
        &h.router,
        Method::POST,
        "/api/v1/tools/file_write/execute",
        Some(json!({"parameters": {"filepath": "hello.txt", "content": "hi"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "file_write");
    assert_eq!(body["result"]["success"], true);

    let (status, body) = send(
        &h.router,
        Method::POST,
        "/api/v1/tools/not_a_tool/execute",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"].is_null());
    assert!(body["error"].as_str().unwrap().contains("not_a_tool"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Layout
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn custom_prefix_and_static_index() {
    let h = harness_with(|config, dir| {
        config.web.api_prefix = "/api/v2/".into();
        std::fs::create_dir_all(dir.join("static")).unwrap();
        std::fs::write(dir.join("static").join("index.html"), "<h1>ClawdLocal</h1>").unwrap();
    });

    let (status, _) = send(&h.router, Method::GET, "/api/v2/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.router, Method::GET, "/api/v1/tools", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&h.router, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("<h1>ClawdLocal</h1>".into()));

    let (status, _) = send(&h.router, Method::GET, "/static/index.html", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn serve_on_stops_on_shutdown_signal() {
    let h = harness();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(WebServer::new(h.agent.clone()).serve_on(listener, async {
        let _ = rx.await;
    }));

    tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

//! `network_request` tool -- make HTTP requests to external services.
//!
//! Supports GET, POST, PUT, PATCH, DELETE and HEAD with optional headers,
//! body and timeout.  Returns the status code, response headers, body and
//! elapsed time.  The body is read chunk by chunk and reading stops at
//! 1 MB; nothing beyond that is buffered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clawdlocal_kernel::{Tool, ToolArgs, ToolError};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AdapterError, Result};

const TOOL_NAME: &str = "network_request";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response body size in bytes (1 MB).
const MAX_BODY_BYTES: usize = 1_024 * 1_024;

/// HTTP client wrapper backing the `network_request` tool.
#[derive(Debug, Clone)]
pub struct NetworkTool {
    client: reqwest::Client,
}

impl NetworkTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ClawdLocal/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn into_tool(self) -> Tool {
        let this = Arc::new(self);
        Tool::new(
            TOOL_NAME,
            "Make HTTP requests to external services",
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to request" },
                    "method": {
                        "type": "string",
                        "description": "HTTP method (default: GET)",
                        "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"]
                    },
                    "headers": {
                        "type": "object",
                        "description": "Optional headers as key-value pairs",
                        "additionalProperties": { "type": "string" }
                    },
                    "body": { "type": "string", "description": "Optional request body" },
                    "timeout_seconds": {
                        "type": "integer",
                        "description": "Request timeout in seconds (default: 30)"
                    }
                },
                "required": ["url"]
            }),
            move |_ctx, args| {
                let this = Arc::clone(&this);
                async move { this.request(&args).await.map_err(ToolError::from) }
            },
        )
    }

    /// Execute one request described by `args`.
    pub async fn request(&self, args: &ToolArgs) -> Result<Value> {
        let url_str = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::invalid(TOOL_NAME, "missing or invalid 'url' parameter"))?;

        let method_str = args
            .get("method")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET");
        let method = parse_method(method_str).ok_or_else(|| {
            AdapterError::invalid(
                TOOL_NAME,
                format!("unsupported HTTP method `{method_str}`"),
            )
        })?;

        let timeout_secs = args
            .get("timeout_seconds")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let url = url::Url::parse(url_str)
            .map_err(|e| AdapterError::invalid(TOOL_NAME, format!("invalid URL `{url_str}`: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AdapterError::invalid(
                TOOL_NAME,
                format!("unsupported URL scheme `{}`", url.scheme()),
            ));
        }

        let mut request = self
            .client
            .request(method, url.clone())
            .timeout(Duration::from_secs(timeout_secs));

        if let Some(headers) = args.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                let Some(value) = value.as_str() else {
                    continue;
                };
                let name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    AdapterError::invalid(TOOL_NAME, format!("invalid header name `{key}`: {e}"))
                })?;
                let value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                    AdapterError::invalid(TOOL_NAME, format!("invalid header value for `{key}`: {e}"))
                })?;
                request = request.header(name, value);
            }
        }

        if let Some(body) = args.get("body").and_then(Value::as_str).filter(|b| !b.is_empty()) {
            request = request.body(body.to_owned());
        }

        debug!(method = method_str, url = %url, timeout_secs, "executing HTTP request");
        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    seconds: timeout_secs,
                    reason: format!("HTTP request to `{url}` timed out"),
                }
            } else {
                AdapterError::ExecutionFailed {
                    tool_name: TOOL_NAME.into(),
                    reason: format!("HTTP request failed: {e}"),
                }
            }
        })?;

        let status_code = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_owned(), v.to_str().unwrap_or("<binary>").to_owned()))
            .collect();

        let (bytes, truncated) = read_capped(response, MAX_BODY_BYTES)
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("failed to read response body: {e}"),
            })?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut body = String::from_utf8_lossy(&bytes).into_owned();
        if truncated {
            body.push_str("\n... [body truncated at 1 MB]");
        }

        debug!(url = %url, status_code, elapsed_ms, body_length = bytes.len(), truncated, "HTTP request completed");

        Ok(json!({
            "status_code": status_code,
            "headers": headers,
            "body": body,
            "truncated": truncated,
            "elapsed_ms": elapsed_ms,
        }))
    }
}

impl Default for NetworkTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Read at most `limit` body bytes.  The flag reports whether the server
/// had more to send.
async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

fn parse_method(method: &str) -> Option<reqwest::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "PATCH" => Some(reqwest::Method::PATCH),
        "DELETE" => Some(reqwest::Method::DELETE),
        "HEAD" => Some(reqwest::Method::HEAD),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

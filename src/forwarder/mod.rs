// Request Forwarder - maps JSON-RPC requests onto remote HTTP calls
pub mod retry;
pub mod upstream;

pub use retry::RetryPolicy;
pub use upstream::{HttpUpstream, Upstream, UpstreamCall};

use crate::{
    errors::{BridgeError, BridgeResult},
    mcp::types::{JsonRpcRequest, JsonRpcResponse, RequestId, ToolCallRequest, ToolCallResult},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "mcp-chroma-bridge";

pub struct Forwarder {
    upstream: Arc<dyn Upstream>,
    retry: RetryPolicy,
}

/// How a request is served.
#[derive(Debug, Clone, PartialEq)]
enum Route {
    /// Answered by the bridge itself.
    Local(Value),
    Remote { call: UpstreamCall, shape: Shape },
}

/// How the remote body becomes a JSON-RPC result.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Envelope,
    ToolList,
    ToolCall,
}

impl Forwarder {
    pub fn new(upstream: Arc<dyn Upstream>, retry: RetryPolicy) -> Self {
        Self { upstream, retry }
    }

    /// Produce the single response for `request`. Never fails: every error is
    /// folded into an error response carrying the request's id.
    pub async fn forward(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        match self.dispatch(request).await {
            Ok(result) => JsonRpcResponse::success(request.id.clone(), result),
            Err(e) => {
                warn!(id = %request.id, method = %request.method, error = %e, "Request failed");
                JsonRpcResponse::from_error(request.id.clone(), &e)
            }
        }
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> BridgeResult<Value> {
        match route(request)? {
            Route::Local(result) => {
                debug!(id = %request.id, method = %request.method, "Answered locally");
                Ok(result)
            }
            Route::Remote { call, shape } => {
                let body = self.call_with_retry(&call, &request.id).await?;
                reshape(shape, body)
            }
        }
    }

    /// Issue `call`, retrying transient failures per the retry policy.
    pub async fn call_with_retry(&self, call: &UpstreamCall, id: &RequestId) -> BridgeResult<Value> {
        let mut attempt = 1;
        loop {
            match self.upstream.send(call).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let backoff = self.retry.delay_for(attempt - 1);
                    warn!(
                        id = %id,
                        path = call.path(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(id = %id, path = call.path(), attempt, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn route(request: &JsonRpcRequest) -> BridgeResult<Route> {
    match request.method.as_str() {
        "initialize" => {
            let protocol_version = request
                .params
                .as_ref()
                .and_then(|p| p.get("protocolVersion"))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PROTOCOL_VERSION);
            Ok(Route::Local(json!({
                "protocolVersion": protocol_version,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            })))
        }
        "ping" => Ok(Route::Local(json!({}))),
        "tools/list" => Ok(Route::Remote {
            call: UpstreamCall::Get { path: "/tools".to_string() },
            shape: Shape::ToolList,
        }),
        "tools/call" => {
            let params = request
                .params
                .clone()
                .ok_or_else(|| BridgeError::InvalidParams("Missing params".to_string()))?;
            let call: ToolCallRequest = serde_json::from_value(params)
                .map_err(|e| BridgeError::InvalidParams(format!("Invalid tool call: {}", e)))?;
            validate_tool_name(&call.name)?;

            let arguments = match call.arguments {
                Value::Null => json!({}),
                other => other,
            };
            Ok(Route::Remote {
                call: UpstreamCall::Post {
                    path: format!("/tools/{}", call.name),
                    body: arguments,
                },
                shape: Shape::ToolCall,
            })
        }
        _ => Ok(Route::Remote {
            call: UpstreamCall::Post {
                path: "/mcp".to_string(),
                body: serde_json::to_value(request)?,
            },
            shape: Shape::Envelope,
        }),
    }
}

fn validate_tool_name(name: &str) -> BridgeResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BridgeError::InvalidParams(format!("Invalid tool name: '{}'", name)))
    }
}

/// If `body` is a JSON-RPC envelope, return its result or its error.
fn unwrap_envelope(body: Value) -> BridgeResult<Result<Value, Value>> {
    let mut object = match body {
        Value::Object(object) if object.contains_key("jsonrpc") => object,
        other => return Ok(Err(other)),
    };
    if let Some(error) = object.remove("error").filter(|e| !e.is_null()) {
        let error = serde_json::from_value(error)
            .map_err(|e| BridgeError::MalformedResponse(format!("Invalid error object: {}", e)))?;
        return Err(BridgeError::Remote(error));
    }
    Ok(Ok(object.remove("result").unwrap_or(Value::Null)))
}

fn reshape(shape: Shape, body: Value) -> BridgeResult<Value> {
    let body = match unwrap_envelope(body)? {
        Ok(result) => return Ok(result),
        Err(plain) => plain,
    };

    match shape {
        Shape::Envelope => Ok(body),
        Shape::ToolList => match body {
            Value::Array(tools) => Ok(json!({ "tools": tools })),
            Value::Object(ref o) if o.contains_key("tools") => Ok(body),
            _ => Err(BridgeError::MalformedResponse(
                "Expected a tool list from remote".to_string(),
            )),
        },
        Shape::ToolCall => {
            let text = match body {
                Value::String(text) => text,
                other => serde_json::to_string(&other)?,
            };
            Ok(serde_json::to_value(ToolCallResult::success(text))?)
        }
    }
}

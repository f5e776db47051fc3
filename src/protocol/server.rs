//! Agent protocol dispatch: initialize/shutdown/tools lifecycle (§6).

use crate::error::{Error, Result};
use crate::protocol::jsonrpc::{
    ErrorCode, Inbound, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "notecache-bridge";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One of the four exposed tools.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool name as it appears in `tools/list` and `tools/call`.
    fn name(&self) -> &'static str;

    /// One-line description surfaced to the agent runtime.
    fn description(&self) -> &'static str;

    /// JSON-Schema-shaped input schema.
    fn input_schema(&self) -> Value;

    /// Execute the tool against already-validated `arguments`.
    async fn call(&self, arguments: Value) -> Result<Value>;
}

/// Outcome of dispatching a single inbound message.
pub enum DispatchOutcome {
    /// A response must be written (request case).
    Respond(JsonRpcResponse),
    /// Nothing to write (notification case).
    NoResponse,
    /// The client asked to terminate; write nothing further and exit.
    Exit,
}

/// Protocol-level server: lifecycle state plus the tool registry.
pub struct Server {
    tools: HashMap<&'static str, Box<dyn ToolHandler>>,
    tool_order: Vec<&'static str>,
    initialized: RwLock<bool>,
}

impl Server {
    pub fn new(tools: Vec<Box<dyn ToolHandler>>) -> Self {
        let tool_order = tools.iter().map(|t| t.name()).collect();
        let map = tools.into_iter().map(|t| (t.name(), t)).collect();
        Self {
            tools: map,
            tool_order,
            initialized: RwLock::new(false),
        }
    }

    /// Handle one parsed inbound line, producing the next action.
    pub async fn dispatch(&self, inbound: Inbound) -> DispatchOutcome {
        match inbound {
            Inbound::Request(req) => {
                let response = self.dispatch_request(req).await;
                DispatchOutcome::Respond(response)
            }
            Inbound::Notification(notification) => {
                if notification.method == "exit" {
                    return DispatchOutcome::Exit;
                }
                tracing::debug!(method = %notification.method, "ignoring notification");
                DispatchOutcome::NoResponse
            }
        }
    }

    async fn dispatch_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.clone();
        match req.method.as_str() {
            "initialize" => {
                *self.initialized.write().await = true;
                JsonRpcResponse::success(id, self.initialize_result())
            }
            "shutdown" => JsonRpcResponse::success(id, Value::Null),
            "tools/list" => JsonRpcResponse::success(id, self.list_tools_result()),
            "tools/call" => self.handle_tools_call(id, req.params).await,
            other => JsonRpcResponse::failure(
                id,
                JsonRpcError::new(
                    ErrorCode::MethodNotFound,
                    format!("unknown method: {other}"),
                ),
            ),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
            "capabilities": { "tools": { "list": true, "get": true, "save": true, "manage": true } },
        })
    }

    fn list_tools_result(&self) -> Value {
        let tools: Vec<Value> = self
            .tool_order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|handler| {
                json!({
                    "name": handler.name(),
                    "description": handler.description(),
                    "inputSchema": handler.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, id: RequestId, params: Value) -> JsonRpcResponse {
        let name = match params.get("name").and_then(Value::as_str) {
            Some(n) => n.to_string(),
            None => {
                return JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(
                        ErrorCode::InvalidParams,
                        "params.name is required".to_string(),
                    ),
                )
            }
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let Some(handler) = self.tools.get(name.as_str()) else {
            return JsonRpcResponse::failure(
                id,
                JsonRpcError::new(ErrorCode::MethodNotFound, format!("unknown tool: {name}")),
            );
        };

        tracing::debug!(tool = %name, "dispatching tool call");
        match handler.call(arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                tracing::warn!(tool = %name, error = %err, "tool call failed");
                let rpc_err: JsonRpcError = (&err).into();
                JsonRpcResponse::failure(id, rpc_err)
            }
        }
    }

    /// Surface an invalid request as a response keyed to a best-effort id.
    pub fn invalid_request_response(id: RequestId, message: String) -> JsonRpcResponse {
        JsonRpcResponse::failure(id, JsonRpcError::new(ErrorCode::InvalidRequest, message))
    }
}

impl From<Error> for JsonRpcError {
    fn from(err: Error) -> Self {
        (&err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn call(&self, arguments: Value) -> Result<Value> {
            Ok(arguments)
        }
    }

    #[tokio::test]
    async fn initialize_sets_flag_and_returns_capabilities() {
        let server = Server::new(vec![]);
        let req = JsonRpcRequest {
            jsonrpc: None,
            id: RequestId::Number(1),
            method: "initialize".to_string(),
            params: json!({}),
        };
        let resp = server.dispatch_request(req).await;
        assert!(resp.error.is_none());
        assert!(*server.initialized.read().await);
    }

    #[tokio::test]
    async fn tools_call_dispatches_to_registered_tool() {
        let server = Server::new(vec![Box::new(EchoTool)]);
        let req = JsonRpcRequest {
            jsonrpc: None,
            id: RequestId::Number(2),
            method: "tools/call".to_string(),
            params: json!({ "name": "echo", "arguments": { "x": 1 } }),
        };
        let resp = server.dispatch_request(req).await;
        assert_eq!(resp.result.unwrap(), json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let server = Server::new(vec![]);
        let req = JsonRpcRequest {
            jsonrpc: None,
            id: RequestId::Number(3),
            method: "tools/call".to_string(),
            params: json!({ "name": "nope" }),
        };
        let resp = server.dispatch_request(req).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::MethodNotFound.code());
    }
}

//! JSON-RPC 2.0 message shapes for the agent protocol (§6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request id: either a string or an integer, per JSON-RPC 2.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// An inbound JSON-RPC request (has an `id`, expects a response).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// An inbound JSON-RPC notification (no `id`, no response expected).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Either a request or a notification, disambiguated by the presence of `id`.
#[derive(Debug, Clone)]
pub enum Inbound {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

/// Parse one line of input into a request or notification.
///
/// Returns a JSON-RPC parse-error response text when the line is not valid
/// JSON; callers write that directly since there is no request id to attach
/// it to one way or the other (id is null per spec for parse errors).
pub fn parse_line(line: &str) -> Result<Inbound, JsonRpcError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| JsonRpcError::new(ErrorCode::ParseError, format!("invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(JsonRpcError::new(
            ErrorCode::InvalidRequest,
            "request must be a JSON object".to_string(),
        ));
    }

    if value.get("id").is_some() {
        let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
            JsonRpcError::new(ErrorCode::InvalidRequest, format!("malformed request: {e}"))
        })?;
        Ok(Inbound::Request(request))
    } else {
        let notification: JsonRpcNotification = serde_json::from_value(value).map_err(|e| {
            JsonRpcError::new(
                ErrorCode::InvalidRequest,
                format!("malformed notification: {e}"),
            )
        })?;
        Ok(Inbound::Notification(notification))
    }
}

/// Standard JSON-RPC 2.0 error codes used by this server (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    /// Application-defined code derived from an [`crate::error::Error`]'s
    /// HTTP-style status (§7).
    Application(i64),
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32000,
            Self::Application(c) => c,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: String) -> Self {
        Self {
            code: code.code(),
            message,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<&crate::error::Error> for JsonRpcError {
    fn from(err: &crate::error::Error) -> Self {
        let status = err.http_status();
        let code = ErrorCode::Application(-32000 - i64::from(status));
        let mut data = serde_json::json!({
            "category": err.category(),
            "http_status": status,
        });
        if let Some(hint) = err.resolution_hint() {
            data["resolution_hint"] = Value::String(hint.to_string());
        }
        Self::new(code, err.to_string()).with_data(data)
    }
}

/// An outbound JSON-RPC response: either a result or an error, never both.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_with_id() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#;
        match parse_line(line).unwrap() {
            Inbound::Request(r) => {
                assert_eq!(r.method, "tools/list");
                assert_eq!(r.id, RequestId::Number(1));
            }
            Inbound::Notification(_) => panic!("expected request"),
        }
    }

    #[test]
    fn parses_notification_without_id() {
        let line = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        match parse_line(line).unwrap() {
            Inbound::Notification(n) => assert_eq!(n.method, "notifications/initialized"),
            Inbound::Request(_) => panic!("expected notification"),
        }
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = parse_line("not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError.code());
    }

    #[test]
    fn backend_error_maps_to_application_code() {
        let err = crate::error::Error::conflict("base mismatch");
        let rpc_err: JsonRpcError = (&err).into();
        assert_eq!(rpc_err.code, -32000 - 409);
        assert!(rpc_err.data.unwrap()["resolution_hint"].is_string());
    }
}

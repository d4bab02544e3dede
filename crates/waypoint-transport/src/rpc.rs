//! JSON-RPC 2.0 wire shapes shared by every transport, normalizing them
//! into a common RPC shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invalid JSON could not be parsed.
pub const PARSE_ERROR: i32 = -32700;
/// The requested method does not exist in the active tool catalog.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Parameters failed normalization or schema validation.
pub const INVALID_PARAMS: i32 = -32602;
/// Catch-all for handler failures that aren't a protocol-level complaint.
pub const INTERNAL_ERROR: i32 = -32603;

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// An inbound call. `id` is `None` for fire-and-forget notifications from
/// the client (rare in practice; clients mostly send requests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// A single JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("unknown method: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl From<waypoint_core::Error> for RpcError {
    fn from(err: waypoint_core::Error) -> Self {
        Self::new(err.rpc_code(), err.to_string())
    }
}

/// A response to one `RpcRequest`. Exactly one of `result`/`error` is set,
/// enforced by construction (`RpcResponse::ok`/`RpcResponse::err`) rather
/// than at the type level, matching the wire shape JSON-RPC expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A server→client push with no `id` and no reply expected: progress
/// ticks, resource-update pings, and `job.*` lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
        }
    }

    pub fn progress(payload: Value) -> Self {
        Self::new("notifications/progress", payload)
    }

    pub fn resource_updated(uri: &str) -> Self {
        Self::new("notifications/resources/updated", serde_json::json!({"uri": uri}))
    }

    pub fn job_event(job_id: uuid::Uuid, event_type: &str, payload: Value) -> Self {
        Self::new(
            format!("job.{event_type}"),
            serde_json::json!({"jobId": job_id, "eventType": event_type, "payload": payload}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deserializes_with_default_params() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn parse_error_line_is_malformed_but_method_missing_is_not_this_layer() {
        let bad = serde_json::from_str::<RpcRequest>("{not json");
        assert!(bad.is_err());
    }

    #[test]
    fn response_omits_absent_error_field() {
        let resp = RpcResponse::ok(Value::from(1), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn response_omits_absent_result_field() {
        let resp = RpcResponse::err(Value::from(1), RpcError::method_not_found("frobnicate"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("\"result\""));
        assert!(json.contains("-32601"));
    }

    #[test]
    fn job_event_notification_shapes_method_as_job_dot_type() {
        let id = uuid::Uuid::nil();
        let note = RpcNotification::job_event(id, "completed", serde_json::json!({}));
        assert_eq!(note.method, "job.completed");
    }

    #[test]
    fn waypoint_error_maps_rpc_code_through() {
        let err: RpcError = waypoint_core::Error::Validation("bad query".to_string()).into();
        assert_eq!(err.code, INVALID_PARAMS);
    }
}

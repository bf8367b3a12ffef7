//! JSON-RPC 2.0 message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Request identifier (numbers from us, either kind from servers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Any message on the wire.
///
/// Variant order matters for untagged decoding: a request carries both `id`
/// and `method`, a notification only `method`, a response only `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn request(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(JsonRpcRequest {
            jsonrpc: default_version(),
            id: RequestId::Number(id),
            method: method.into(),
            params,
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(JsonRpcNotification {
            jsonrpc: default_version(),
            method: method.into(),
            params,
        })
    }

    pub fn result(id: RequestId, result: Value) -> Self {
        Self::Response(JsonRpcResponse {
            jsonrpc: default_version(),
            id: Some(id),
            result: Some(result),
            error: None,
        })
    }

    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self::Response(JsonRpcResponse {
            jsonrpc: default_version(),
            id: Some(id),
            result: None,
            error: Some(error),
        })
    }

    /// Decode one line or body; `None` for anything that is not JSON-RPC.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Decode a JSON value that may be a single message or a batch.
    pub fn from_value_batch(value: Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            other => serde_json::from_value(other).ok().into_iter().collect(),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_omits_missing_params() {
        let json = serde_json::to_string(&JsonRpcMessage::request(1, "tools/list", None)).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_decodes_each_kind() {
        let req = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#);
        assert!(matches!(req, Some(JsonRpcMessage::Request(r)) if r.id == RequestId::String("a".into())));

        let note = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#,
        );
        assert!(matches!(note, Some(JsonRpcMessage::Notification(_))));

        let resp = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#);
        match resp {
            Some(JsonRpcMessage::Response(r)) => {
                assert_eq!(r.id, Some(RequestId::Number(1)));
                assert_eq!(r.result, Some(json!({"tools": []})));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_error_response() {
        let msg = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        );
        match msg {
            Some(JsonRpcMessage::Response(r)) => {
                assert_eq!(r.error.unwrap().code, METHOD_NOT_FOUND);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_non_json_lines_skipped() {
        assert!(JsonRpcMessage::parse("npm WARN deprecated").is_none());
        assert!(JsonRpcMessage::parse("").is_none());
        assert!(JsonRpcMessage::parse("{not json").is_none());
    }

    #[test]
    fn test_batch_decoding() {
        let batch = json!([
            {"jsonrpc": "2.0", "id": 1, "result": {}},
            {"jsonrpc": "2.0", "method": "notifications/prompts/list_changed"}
        ]);
        assert_eq!(JsonRpcMessage::from_value_batch(batch).len(), 2);
    }
}

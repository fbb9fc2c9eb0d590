//! JSON-RPC 2.0 framing — one JSON object per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

pub const METHOD_NOT_FOUND: i64 = -32601;

/// Outgoing request or notification (`id` omitted).
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> Envelope<'a> {
    pub fn request(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method,
            params,
        }
    }

    pub fn notification(method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method,
            params,
        }
    }
}

/// Reply to a server-initiated request.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Reply {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(serde_json::json!({
                "code": METHOD_NOT_FOUND,
                "message": format!("Method not found: {method}"),
            })),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Error object carried by a response.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
}

impl RpcFailure {
    fn from_value(value: &Value) -> Self {
        let code = value.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = match value.get("message").and_then(Value::as_str) {
            Some(m) => m.to_string(),
            None => value.to_string(),
        };
        Self { code, message }
    }
}

/// What one inbound line turned out to be.
#[derive(Debug, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests.
    Response {
        id: u64,
        outcome: ResponseOutcome,
    },
    /// Request from the server that expects a reply.
    ServerRequest { id: Value, method: String },
    Notification { method: String },
}

#[derive(Debug, PartialEq)]
pub enum ResponseOutcome {
    Result(Value),
    Error(RpcFailure),
    /// Neither `result` nor `error` present.
    Malformed,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("response id {0} is not an integer")]
    BadId(Value),
    #[error("line is neither a response, request nor notification")]
    Unclassified,
}

/// Classify one decoded line.
pub fn decode_line(line: &str) -> Result<Incoming, DecodeError> {
    let raw: RawLine = serde_json::from_str(line).map_err(|e| DecodeError::Json(e.to_string()))?;

    match (raw.id, raw.method) {
        (Some(id), Some(method)) => Ok(Incoming::ServerRequest { id, method }),
        (None, Some(method)) => Ok(Incoming::Notification { method }),
        (Some(id), None) => {
            let numeric = id
                .as_u64()
                .or_else(|| id.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| DecodeError::BadId(id.clone()))?;
            let outcome = match (raw.error, raw.result) {
                (Some(err), _) => ResponseOutcome::Error(RpcFailure::from_value(&err)),
                (None, Some(result)) => ResponseOutcome::Result(result),
                (None, None) => ResponseOutcome::Malformed,
            };
            Ok(Incoming::Response {
                id: numeric,
                outcome,
            })
        }
        (None, None) => Err(DecodeError::Unclassified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_framing() {
        let params = json!({"name": "echo"});
        let line = serde_json::to_string(&Envelope::request(7, METHOD_TOOLS_CALL, &params)).unwrap();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v, json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "echo"}}));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_notification_has_no_id() {
        let params = json!({});
        let line = serde_json::to_string(&Envelope::notification(METHOD_INITIALIZED, &params)).unwrap();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["method"], "notifications/initialized");
    }

    #[test]
    fn test_decode_result() {
        let incoming = decode_line(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(
            incoming,
            Incoming::Response {
                id: 3,
                outcome: ResponseOutcome::Result(json!({"tools": []}))
            }
        );
    }

    #[test]
    fn test_decode_error_wins_over_result() {
        let incoming =
            decode_line(r#"{"jsonrpc":"2.0","id":"4","error":{"code":-32602,"message":"bad params"}}"#)
                .unwrap();
        assert_eq!(
            incoming,
            Incoming::Response {
                id: 4,
                outcome: ResponseOutcome::Error(RpcFailure {
                    code: -32602,
                    message: "bad params".into()
                })
            }
        );
    }

    #[test]
    fn test_decode_empty_response_is_malformed() {
        let incoming = decode_line(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(matches!(
            incoming,
            Incoming::Response {
                outcome: ResponseOutcome::Malformed,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_server_traffic() {
        assert_eq!(
            decode_line(r#"{"jsonrpc":"2.0","id":"s1","method":"ping"}"#).unwrap(),
            Incoming::ServerRequest {
                id: json!("s1"),
                method: "ping".into()
            }
        );
        assert_eq!(
            decode_line(r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#).unwrap(),
            Incoming::Notification {
                method: "notifications/tools/list_changed".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_line("npm WARN deprecated"), Err(DecodeError::Json(_))));
        assert_eq!(decode_line(r#"{"jsonrpc":"2.0"}"#), Err(DecodeError::Unclassified));
        assert!(matches!(
            decode_line(r#"{"jsonrpc":"2.0","id":"abc","result":{}}"#),
            Err(DecodeError::BadId(_))
        ));
    }

    #[test]
    fn test_method_not_found_reply() {
        let reply = Reply::method_not_found(json!(9), "sampling/createMessage");
        let v = serde_json::to_value(&reply).unwrap();
        assert_eq!(v["error"]["code"], -32601);
        assert!(v.get("result").is_none());
    }
}

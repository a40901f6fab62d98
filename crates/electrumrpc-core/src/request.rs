//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC request ID — string or number.
///
/// Requests minted by this crate always carry string ids; numeric ids are
/// accepted so custom generators and servers that echo numbers still match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
}

impl RpcId {
    /// Textual form used to correlate responses with pending requests.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl From<String> for RpcId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<u64> for RpcId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: impl Into<RpcId>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Serialize as one newline-terminated line, ready for the wire.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// An error returned by the server in a response envelope.
///
/// Servers send either a bare string or a `{code, message}` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

impl RpcError {
    /// Build from the raw `error` field of a response.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(message) => Self {
                code: None,
                message: message.clone(),
            },
            Value::Object(obj) => Self {
                code: obj.get("code").and_then(Value::as_i64),
                message: obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| value.to_string()),
            },
            other => Self {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a request. `id` is `None` when the server sent `"id": null`.
    Response {
        id: Option<String>,
        outcome: Result<Value, RpcError>,
    },
    /// Unsolicited server push, dispatched by method name.
    Notification { method: String, params: Value },
}

/// Reasons an inbound line cannot be dispatched.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("batch request is not supported")]
    Batch,

    #[error("expected a JSON object, got: {0}")]
    NotAnObject(String),

    #[error("notification without a method name")]
    MissingMethod,
}

/// Parse one framed line and classify it as a response or a notification.
pub fn parse_inbound(text: &str) -> Result<Inbound, InboundError> {
    let value: Value = serde_json::from_str(text)?;
    let mut obj = match value {
        Value::Object(obj) => obj,
        Value::Array(_) => return Err(InboundError::Batch),
        other => return Err(InboundError::NotAnObject(other.to_string())),
    };

    if let Some(id) = obj.remove("id") {
        let id = match id {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        };
        let outcome = match obj.remove("error") {
            Some(Value::Null) | None => Ok(obj.remove("result").unwrap_or(Value::Null)),
            Some(err) => Err(RpcError::from_value(&err)),
        };
        return Ok(Inbound::Response { id, outcome });
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(InboundError::MissingMethod),
    };
    let params = obj.remove("params").unwrap_or(Value::Array(Vec::new()));
    Ok(Inbound::Notification { method, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_line_is_newline_terminated() {
        let req = JsonRpcRequest::new(
            "7".to_string(),
            "server.version",
            vec![json!("electrumrpc"), json!("1.4.2")],
        );
        let line = req.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let back: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(back["jsonrpc"], "2.0");
        assert_eq!(back["method"], "server.version");
        assert_eq!(back["id"], "7");
        assert_eq!(back["params"][1], "1.4.2");
    }

    #[test]
    fn response_with_result() {
        let msg = parse_inbound(r#"{"jsonrpc":"2.0","id":"3","result":{"height":5}}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Response {
                id: Some("3".into()),
                outcome: Ok(json!({"height": 5})),
            }
        );
    }

    #[test]
    fn numeric_id_matches_string_key() {
        let msg = parse_inbound(r#"{"id":12,"result":null}"#).unwrap();
        match msg {
            Inbound::Response { id, .. } => assert_eq!(id.as_deref(), Some("12")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(RpcId::Number(12).key(), "12");
    }

    #[test]
    fn error_as_bare_string() {
        let msg = parse_inbound(r#"{"id":"1","error":"unknown method"}"#).unwrap();
        match msg {
            Inbound::Response { outcome: Err(e), .. } => {
                assert_eq!(e.code, None);
                assert_eq!(e.to_string(), "unknown method");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_as_structure() {
        let msg = parse_inbound(
            r#"{"id":"1","error":{"code":-32600,"message":"daemon error"}}"#,
        )
        .unwrap();
        match msg {
            Inbound::Response { outcome: Err(e), .. } => {
                assert_eq!(e.code, Some(-32600));
                assert_eq!(e.message, "daemon error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn null_error_is_success() {
        let msg = parse_inbound(r#"{"id":"1","error":null,"result":true}"#).unwrap();
        match msg {
            Inbound::Response { outcome, .. } => assert_eq!(outcome, Ok(json!(true))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn null_id_is_a_response_without_key() {
        let msg = parse_inbound(r#"{"id":null,"error":"parse error"}"#).unwrap();
        assert!(matches!(msg, Inbound::Response { id: None, .. }));
    }

    #[test]
    fn notification_without_id() {
        let msg = parse_inbound(
            r#"{"jsonrpc":"2.0","method":"blockchain.headers.subscribe","params":[{"height":800000}]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Inbound::Notification {
                method: "blockchain.headers.subscribe".into(),
                params: json!([{"height": 800000}]),
            }
        );
    }

    #[test]
    fn batch_is_rejected() {
        let err = parse_inbound(r#"[{"id":"1","result":1}]"#).unwrap_err();
        assert!(matches!(err, InboundError::Batch));
        assert_eq!(err.to_string(), "batch request is not supported");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(parse_inbound("not json"), Err(InboundError::Json(_))));
        assert!(matches!(parse_inbound("42"), Err(InboundError::NotAnObject(_))));
        assert!(matches!(parse_inbound(r#"{"params":[]}"#), Err(InboundError::MissingMethod)));
    }
}

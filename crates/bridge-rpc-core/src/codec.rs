//! Wire shapes and message classification.
//!
//! Every message carries `"jsonrpc": "2.0"`. Outbound messages are built with
//! the [`Message`] constructors; inbound messages arrive as raw JSON and are
//! sorted by [`classify`] using field-presence predicates only.
//!
//! ```text
//! Notification    {"jsonrpc":"2.0","method":"log","params":["hi"]}
//! Request         {"jsonrpc":"2.0","method":"add","params":[2,3],"id":0}
//! ResponseResult  {"jsonrpc":"2.0","id":0,"result":5}
//! ResponseError   {"jsonrpc":"2.0","id":0,"error":{"code":-32601,"message":"Method not found","data":"ghost"}}
//! ```

use crate::config::RpcConfig;
use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id as it appears on the wire.
///
/// Ids issued by this crate are non-negative integers, but inbound ids are
/// echoed back verbatim whatever their JSON type.
pub type Id = Value;

/// JSON-RPC 2.0 request: a notification plus a correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
    pub id: Id,
}

/// JSON-RPC 2.0 notification. No reply is ever sent for one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
}

/// Exactly one of `result` / `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(RpcError),
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Id,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

/// Any outbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    pub fn request(id: impl Into<Id>, method: impl Into<String>, params: Option<Vec<Value>>) -> Self {
        Message::Request(Request {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: id.into(),
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<Vec<Value>>) -> Self {
        Message::Notification(Notification {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        })
    }

    pub fn result(id: impl Into<Id>, result: Value) -> Self {
        Message::Response(Response {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            id: id.into(),
            payload: ResponsePayload::Result(result),
        })
    }

    pub fn error(id: impl Into<Id>, error: RpcError) -> Self {
        Message::Response(Response {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            id: id.into(),
            payload: ResponsePayload::Error(error),
        })
    }

    /// Correlation id, if this shape carries one.
    pub fn id(&self) -> Option<&Id> {
        match self {
            Message::Request(req) => Some(&req.id),
            Message::Notification(_) => None,
            Message::Response(resp) => Some(&resp.id),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(req) => Some(&req.method),
            Message::Notification(note) => Some(&note.method),
            Message::Response(_) => None,
        }
    }

    /// Encode to a JSON value, as handed to transports that deliver
    /// structured data.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

fn has_field(msg: &Value, field: &str) -> bool {
    msg.as_object().is_some_and(|obj| obj.contains_key(field))
}

/// True iff `method` is present.
pub fn is_request_or_notification(msg: &Value) -> bool {
    has_field(msg, "method")
}

pub fn is_notification(msg: &Value) -> bool {
    is_request_or_notification(msg) && !has_field(msg, "id")
}

pub fn is_request(msg: &Value) -> bool {
    is_request_or_notification(msg) && has_field(msg, "id")
}

pub fn is_response_result(msg: &Value) -> bool {
    has_field(msg, "result")
}

pub fn is_response_error(msg: &Value) -> bool {
    has_field(msg, "error")
}

pub fn is_response(msg: &Value) -> bool {
    is_response_result(msg) || is_response_error(msg)
}

/// An inbound message sorted into exactly one path.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `method` is `None` when the field is present but not a usable name.
    Notification {
        method: Option<String>,
        params: Option<Value>,
    },
    Request {
        id: Id,
        method: Option<String>,
        params: Option<Value>,
    },
    Response {
        id: Id,
        outcome: Result<Value, RpcError>,
    },
    Malformed {
        id: Option<Id>,
        reason: &'static str,
    },
}

/// Sort a decoded message into one path.
///
/// `method` takes precedence over `result`/`error`, and a response carrying
/// both `result` and `error` is treated as an error.
pub fn classify(msg: &Value) -> Inbound {
    let Some(obj) = msg.as_object() else {
        return Inbound::Malformed {
            id: None,
            reason: "message is not a JSON object",
        };
    };

    if is_request_or_notification(msg) {
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let params = obj.get("params").cloned();

        return match obj.get("id") {
            Some(id) => Inbound::Request {
                id: id.clone(),
                method,
                params,
            },
            None => Inbound::Notification { method, params },
        };
    }

    let id = obj.get("id").cloned();

    if is_response(msg) {
        let Some(id) = id else {
            return Inbound::Malformed {
                id: None,
                reason: "response without id",
            };
        };
        let outcome = match obj.get("error") {
            Some(error) => Err(decode_error(error)),
            None => Ok(obj.get("result").cloned().unwrap_or(Value::Null)),
        };
        return Inbound::Response { id, outcome };
    }

    Inbound::Malformed {
        id,
        reason: "no method, result or error",
    }
}

// Error members that are not a well-formed error object still settle the
// call, as an internal error carrying the raw value.
fn decode_error(error: &Value) -> RpcError {
    serde_json::from_value::<RpcError>(error.clone())
        .unwrap_or_else(|_| RpcError::internal_error(error.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let msg = Message::request(0u64, "add", Some(vec![json!(2), json!(3)]));
        assert_eq!(
            msg.to_value().unwrap(),
            json!({"jsonrpc": "2.0", "method": "add", "params": [2, 3], "id": 0})
        );
    }

    #[test]
    fn test_notification_without_params_omits_field() {
        let msg = Message::notification("ready", None);
        assert_eq!(
            msg.to_value().unwrap(),
            json!({"jsonrpc": "2.0", "method": "ready"})
        );
        assert!(msg.id().is_none());
    }

    #[test]
    fn test_response_wire_shapes() {
        let ok = Message::result(json!(4), json!(5));
        assert_eq!(
            ok.to_value().unwrap(),
            json!({"jsonrpc": "2.0", "id": 4, "result": 5})
        );

        let null_result = Message::result(json!(1), Value::Null);
        assert_eq!(
            null_result.to_value().unwrap(),
            json!({"jsonrpc": "2.0", "id": 1, "result": null})
        );

        let err = Message::error(json!(4), RpcError::method_not_found("ghost"));
        assert_eq!(
            err.to_value().unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "error": {"code": -32601, "message": "Method not found", "data": "ghost"}
            })
        );
    }

    #[test]
    fn test_predicates_partition_well_formed_messages() {
        let cases = [
            (json!({"jsonrpc": "2.0", "method": "m"}), "notification"),
            (json!({"jsonrpc": "2.0", "method": "m", "id": 1}), "request"),
            (json!({"jsonrpc": "2.0", "id": 1, "result": 1}), "response"),
            (json!({"jsonrpc": "2.0", "id": 1, "error": {"code": 1, "message": "x"}}), "response"),
        ];

        for (msg, expected) in cases {
            let hits: Vec<&str> = [
                (is_notification(&msg), "notification"),
                (is_request(&msg), "request"),
                (is_response(&msg), "response"),
            ]
            .into_iter()
            .filter_map(|(hit, name)| hit.then_some(name))
            .collect();
            assert_eq!(hits, vec![expected], "message {msg}");
        }
    }

    #[test]
    fn test_predicates_reject_non_objects() {
        for msg in [Value::Null, json!(3), json!("method"), json!([{"method": "m"}])] {
            assert!(!is_request_or_notification(&msg));
            assert!(!is_response(&msg));
        }
    }

    #[test]
    fn test_classify_request_keeps_raw_params() {
        let msg = json!({"jsonrpc": "2.0", "method": "add", "params": [2, 3], "id": "a"});
        assert_eq!(
            classify(&msg),
            Inbound::Request {
                id: json!("a"),
                method: Some("add".into()),
                params: Some(json!([2, 3])),
            }
        );
    }

    #[test]
    fn test_classify_unusable_method_name() {
        let msg = json!({"jsonrpc": "2.0", "method": 12, "id": 1});
        assert!(matches!(classify(&msg), Inbound::Request { method: None, .. }));

        let msg = json!({"jsonrpc": "2.0", "method": ""});
        assert!(matches!(classify(&msg), Inbound::Notification { method: None, .. }));
    }

    #[test]
    fn test_classify_error_wins_over_result() {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": 1,
            "error": {"code": -32000, "message": "nope"}
        });
        match classify(&msg) {
            Inbound::Response { outcome: Err(err), .. } => assert_eq!(err.code, -32000),
            other => panic!("Expected error response, got: {:?}", other),
        }
    }

    #[test]
    fn test_classify_coerces_unstructured_error() {
        let msg = json!({"jsonrpc": "2.0", "id": 2, "error": "boom"});
        match classify(&msg) {
            Inbound::Response { outcome: Err(err), .. } => {
                assert_eq!(err.code, -32603);
                assert_eq!(err.data, Some(json!("boom")));
            }
            other => panic!("Expected error response, got: {:?}", other),
        }
    }

    #[test]
    fn test_classify_malformed() {
        assert!(matches!(
            classify(&json!({})),
            Inbound::Malformed { id: None, .. }
        ));
        assert!(matches!(
            classify(&json!({"jsonrpc": "2.0", "id": 9})),
            Inbound::Malformed { id: Some(_), .. }
        ));
        assert!(matches!(
            classify(&json!({"jsonrpc": "2.0", "result": 1})),
            Inbound::Malformed { id: None, .. }
        ));
        assert!(matches!(classify(&json!("text")), Inbound::Malformed { .. }));
    }
}

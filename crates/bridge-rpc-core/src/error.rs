//! Error types for bridge-rpc.
//!
//! Three layers of failure are kept apart:
//! - [`RpcError`]: the JSON-RPC error object that travels on the wire.
//! - [`CallError`]: what a local caller observes when a call does not resolve.
//! - [`TransportError`]: a failed send through the injected transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Reserved JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Invalid JSON was received.
    ParseError,
    /// The message is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameter(s).
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32600 => Some(ErrorCode::InvalidRequest),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// JSON-RPC 2.0 error object.
///
/// Handlers return this to send a structured error back to the caller, and
/// callers receive it reconstructed from the remote `error` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create an application-defined error.
    pub fn new(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    fn reserved(code: ErrorCode, data: Option<Value>) -> Self {
        Self::new(code.code(), code.message(), data)
    }

    pub fn parse_error(data: impl Into<Value>) -> Self {
        Self::reserved(ErrorCode::ParseError, Some(data.into()))
    }

    pub fn invalid_request(data: impl Into<Value>) -> Self {
        Self::reserved(ErrorCode::InvalidRequest, Some(data.into()))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::reserved(ErrorCode::MethodNotFound, Some(Value::String(method.to_string())))
    }

    pub fn invalid_params(data: impl Into<Value>) -> Self {
        Self::reserved(ErrorCode::InvalidParams, Some(data.into()))
    }

    pub fn internal_error(data: impl Into<Value>) -> Self {
        Self::reserved(ErrorCode::InternalError, Some(data.into()))
    }

    /// The reserved code this error carries, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

// Anything that is not already an RpcError is reported as an internal error
// with its display text as `data`.
impl From<anyhow::Error> for RpcError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RpcError>() {
            Ok(rpc) => rpc,
            Err(other) => RpcError::internal_error(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::internal_error(err.to_string())
    }
}

/// Failure observed by a local caller of [`crate::RpcPeer::call`].
#[derive(Debug, Error)]
pub enum CallError {
    /// The remote handler (or the local one, for a host-side invoke) failed.
    #[error("Remote error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Request {id} ({method}) timed out after {timeout:?}")]
    Timeout {
        id: u64,
        method: String,
        timeout: Duration,
    },

    #[error("Peer closed before request {id} ({method}) settled")]
    Closed { id: u64, method: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl CallError {
    /// The structured remote error, if the call failed on the other side.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            CallError::Rpc(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }
}

/// Failure to hand a message to the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_codes() {
        assert_eq!(ErrorCode::ParseError.code(), -32700);
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::InvalidParams.code(), -32602);
        assert_eq!(ErrorCode::InternalError.code(), -32603);
        assert_eq!(ErrorCode::from_code(-32601), Some(ErrorCode::MethodNotFound));
        assert_eq!(ErrorCode::from_code(-32000), None);
    }

    #[test]
    fn test_method_not_found_shape() {
        let err = RpcError::method_not_found("ghost");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"code": -32601, "message": "Method not found", "data": "ghost"})
        );
        assert_eq!(err.error_code(), Some(ErrorCode::MethodNotFound));
    }

    #[test]
    fn test_error_without_data_omits_field() {
        let err = RpcError::new(-32000, "Out of coffee", None);
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("data"));
        assert_eq!(err.to_string(), "Out of coffee (code -32000)");
    }

    #[test]
    fn test_anyhow_coercion() {
        let plain: RpcError = anyhow::anyhow!("disk on fire").into();
        assert_eq!(plain.code, -32603);
        assert_eq!(plain.data, Some(json!("disk on fire")));

        let wrapped: RpcError = anyhow::Error::new(RpcError::invalid_params("bad")).into();
        assert_eq!(wrapped.code, -32602);
    }

    #[test]
    fn test_call_error_display() {
        let err = CallError::Timeout {
            id: 7,
            method: "slow".into(),
            timeout: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "Request 7 (slow) timed out after 50ms");
        assert!(err.is_timeout());
        assert!(err.rpc_error().is_none());
    }
}

//! Methods the listening side exposes to connected clients.

use anyhow::anyhow;
use async_trait::async_trait;
use bridge_rpc_core::{handler_fn, Handler, Methods, RpcError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest delay `sleep` will honour.
const MAX_SLEEP_MS: u64 = 60_000;

/// Returns its positional params unchanged.
struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn call(&self, params: Vec<Value>) -> Result<Value, RpcError> {
        Ok(Value::Array(params))
    }
}

/// Build the method set served on every connection.
pub fn host_methods() -> Methods {
    Methods::new()
        .with(
            "ping",
            handler_fn(|(): ()| async { Ok::<_, RpcError>("pong") }),
        )
        .with(
            "add",
            handler_fn(|(a, b): (f64, f64)| async move { Ok::<_, RpcError>(a + b) }),
        )
        .with("echo", Arc::new(Echo))
        .with(
            "sleep",
            handler_fn(|(ms,): (u64,)| async move {
                if ms > MAX_SLEEP_MS {
                    return Err(RpcError::invalid_params(format!(
                        "sleep is limited to {MAX_SLEEP_MS}ms, got {ms}ms"
                    )));
                }
                debug!(ms, "Sleeping before reply");
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            }),
        )
        .with(
            "fail",
            handler_fn(|(): ()| async { Err::<(), _>(anyhow!("Requested failure")) }),
        )
        .with(
            "log",
            handler_fn(|(level, message): (String, String)| async move {
                match level.as_str() {
                    "warn" | "error" => warn!(from = "client", "{}", message),
                    _ => info!(from = "client", "{}", message),
                }
                Ok::<_, RpcError>(())
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_rpc_core::{ErrorCode, MethodRegistry};
    use serde_json::json;

    fn registry() -> MethodRegistry {
        let registry = MethodRegistry::new();
        registry.register(host_methods());
        registry
    }

    #[test]
    fn test_host_methods_names() {
        assert_eq!(
            registry().names(),
            vec!["add", "echo", "fail", "log", "ping", "sleep"]
        );
    }

    #[tokio::test]
    async fn test_ping_and_add() {
        let registry = registry();
        assert_eq!(registry.invoke("ping", None).await.unwrap(), json!("pong"));
        assert_eq!(
            registry
                .invoke("add", Some(vec![json!(1.5), json!(2)]))
                .await
                .unwrap(),
            json!(3.5)
        );
    }

    #[tokio::test]
    async fn test_echo_returns_params() {
        let result = registry()
            .invoke("echo", Some(vec![json!("a"), json!({"b": 1})]))
            .await
            .unwrap();
        assert_eq!(result, json!(["a", {"b": 1}]));
    }

    #[tokio::test]
    async fn test_fail_is_internal_error() {
        let err = registry().invoke("fail", None).await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InternalError));
        assert_eq!(err.data, Some(json!("Requested failure")));
    }

    #[tokio::test]
    async fn test_sleep_rejects_long_delays() {
        let err = registry()
            .invoke("sleep", Some(vec![json!(MAX_SLEEP_MS + 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidParams));
    }
}

//! Inbound message dispatch.
//!
//! Every message the transport delivers goes through [`Dispatcher::handle_raw`],
//! which classifies it once and takes exactly one path:
//!
//! - **notification**: run the handler, log any failure, never reply
//! - **request**: run the handler, reply with exactly one result or error
//! - **response**: settle the matching pending call, or report it unmatched
//! - **malformed**: log and drop
//!
//! Handlers run on spawned tasks so a slow or re-entrant handler never holds
//! up the inbound stream. Response correlation runs inline.

use crate::codec::{classify, Id, Inbound, Message};
use crate::error::RpcError;
use crate::pending::PendingCalls;
use crate::registry::MethodRegistry;
use crate::transport::Outbound;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Routes inbound messages to the registry or the pending-call table.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    pending: Arc<PendingCalls>,
    outbound: Outbound,
    reply_to_unmatched: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<MethodRegistry>,
        pending: Arc<PendingCalls>,
        outbound: Outbound,
        reply_to_unmatched: bool,
    ) -> Self {
        Self {
            registry,
            pending,
            outbound,
            reply_to_unmatched,
        }
    }

    /// Entry point for every inbound message. Never panics.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_raw(&self, raw: Value) {
        if raw.is_null() {
            return;
        }

        let dispatched = std::panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&raw)));
        if let Err(panic) = dispatched {
            error!(
                side = %self.outbound.label(),
                message = %raw,
                panic = panic_message(&*panic),
                "Failed to dispatch message"
            );
        }
    }

    fn dispatch(&self, raw: &Value) {
        match classify(raw) {
            Inbound::Notification { method, params } => self.handle_notification(method, params),
            Inbound::Request { id, method, params } => self.handle_request(id, method, params),
            Inbound::Response { id, outcome } => self.handle_response(id, outcome),
            Inbound::Malformed { id, reason } => {
                warn!(
                    side = %self.outbound.label(),
                    id = ?id,
                    reason,
                    message = %raw,
                    "Dropping malformed message"
                );
            }
        }
    }

    fn handle_notification(&self, method: Option<String>, params: Option<Value>) {
        let label = self.outbound.label();
        let Some(method) = method else {
            warn!(side = %label, "No method specified in notification");
            return;
        };
        let params = match positional(params) {
            Ok(params) => params,
            Err(err) => {
                warn!(side = %label, method = %method, error = %err, "Dropping notification");
                return;
            }
        };

        debug!(side = %label, method = %method, "Handling notification");
        let registry = Arc::clone(&self.registry);
        let label = label.to_string();
        tokio::spawn(async move {
            if let Err(err) = guarded(registry.invoke(&method, params)).await {
                warn!(side = %label, method = %method, error = %err, "Notification handler failed");
            }
        });
    }

    fn handle_request(&self, id: Id, method: Option<String>, params: Option<Value>) {
        let Some(method) = method else {
            warn!(side = %self.outbound.label(), id = %id, "No method specified in request");
            self.outbound.send(Message::error(
                id,
                RpcError::invalid_request("No method specified in message"),
            ));
            return;
        };
        let params = match positional(params) {
            Ok(params) => params,
            Err(err) => {
                self.outbound.send(Message::error(id, err));
                return;
            }
        };

        debug!(side = %self.outbound.label(), id = %id, method = %method, "Handling request");
        let registry = Arc::clone(&self.registry);
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let reply = match guarded(registry.invoke(&method, params)).await {
                Ok(result) => Message::result(id, result),
                Err(err) => {
                    debug!(side = %outbound.label(), method = %method, error = %err, "Request failed");
                    Message::error(id, err)
                }
            };
            outbound.send(reply);
        });
    }

    fn handle_response(&self, id: Id, outcome: Result<Value, RpcError>) {
        let is_result = outcome.is_ok();
        let settled = id
            .as_u64()
            .is_some_and(|key| self.pending.resolve(key, outcome));
        if settled {
            return;
        }

        let id_text = match &id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        warn!(side = %self.outbound.label(), id = %id_text, "Missing callback for response");

        // Answering an unmatched error could bounce between two peers forever.
        if self.reply_to_unmatched && is_result {
            self.outbound.send(Message::error(
                id,
                RpcError::invalid_request(format!("Missing callback for {}", id_text)),
            ));
        }
    }
}

/// Turn the raw `params` member into positional arguments.
fn positional(params: Option<Value>) -> Result<Option<Vec<Value>>, RpcError> {
    match params {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(RpcError::invalid_params("params must be an array")),
    }
}

/// Run a handler future, turning a panic into an internal error.
async fn guarded<F>(fut: F) -> Result<Value, RpcError>
where
    F: Future<Output = Result<Value, RpcError>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(RpcError::internal_error(panic_message(&*panic))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

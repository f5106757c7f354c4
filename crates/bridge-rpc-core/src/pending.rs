//! Pending-call table: correlation state for outstanding requests.
//!
//! Each outstanding request owns one entry holding its completion channel and
//! the abort handle of its timer task. Presence in the table is the waiting
//! state; whichever of response or timer removes the entry settles the call,
//! and the other finds nothing and does nothing.

use crate::error::{CallError, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::warn;

/// Terminal outcome delivered to a waiting caller.
pub type Completion = Result<Value, CallError>;

/// One in-flight call.
#[derive(Debug)]
pub struct PendingCall {
    method: String,
    completion: oneshot::Sender<Completion>,
    timer: Option<AbortHandle>,
}

impl PendingCall {
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Receiving half handed back to the caller.
pub type CompletionReceiver = oneshot::Receiver<Completion>;

/// Table of in-flight calls keyed by the id this side issued.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<u64, PendingCall>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a call and arm its timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn insert(self: &Arc<Self>, id: u64, method: &str, timeout: Duration) -> CompletionReceiver {
        let (tx, rx) = oneshot::channel();

        // Insert before arming so a zero timeout still finds the entry.
        self.lock().insert(
            id,
            PendingCall {
                method: method.to_string(),
                completion: tx,
                timer: None,
            },
        );

        let table = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.expire(id, timeout);
        });

        if let Some(call) = self.lock().get_mut(&id) {
            call.timer = Some(timer.abort_handle());
        }

        rx
    }

    /// Settle a call with the remote outcome.
    ///
    /// Returns `false` when no call with this id is waiting (already settled,
    /// timed out, or never issued here).
    pub fn resolve(&self, id: u64, outcome: Result<Value, RpcError>) -> bool {
        let Some(call) = self.lock().remove(&id) else {
            return false;
        };
        if let Some(timer) = call.timer {
            timer.abort();
        }
        // The caller may have stopped waiting; nothing to report then.
        let _ = call.completion.send(outcome.map_err(CallError::Rpc));
        true
    }

    /// Timer path: settle with a timeout if the call is still waiting.
    fn expire(&self, id: u64, timeout: Duration) -> bool {
        let Some(call) = self.lock().remove(&id) else {
            return false;
        };
        warn!(id, method = %call.method, ?timeout, "Request timed out");
        let _ = call.completion.send(Err(CallError::Timeout {
            id,
            method: call.method,
            timeout,
        }));
        true
    }

    /// Fail every waiting call with [`CallError::Closed`].
    pub fn close_all(&self) -> usize {
        let drained: Vec<(u64, PendingCall)> = self.lock().drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            if let Some(timer) = call.timer {
                timer.abort();
            }
            let _ = call.completion.send(Err(CallError::Closed {
                id,
                method: call.method,
            }));
        }
        count
    }

    pub fn contains(&self, id: u64) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

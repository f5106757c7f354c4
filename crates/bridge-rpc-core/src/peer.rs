//! One side of the bridge.
//!
//! [`RpcPeer`] owns the method registry, the pending-call table and the id
//! counter for a single channel, and exposes the caller API on top of them.
//! Clones share the same state.

use crate::codec::Message;
use crate::config::{PeerOptions, Role};
use crate::dispatcher::Dispatcher;
use crate::error::CallError;
use crate::pending::PendingCalls;
use crate::registry::{BoxedHandler, MethodRegistry, Methods};
use crate::transport::{Outbound, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

struct PeerInner {
    options: PeerOptions,
    registry: Arc<MethodRegistry>,
    pending: Arc<PendingCalls>,
    dispatcher: Dispatcher,
    outbound: Outbound,
    next_id: AtomicU64,
}

/// JSON-RPC endpoint bound to one transport.
#[derive(Clone)]
pub struct RpcPeer {
    inner: Arc<PeerInner>,
}

impl RpcPeer {
    /// Create a peer with default options.
    pub fn new(transport: impl Transport) -> Self {
        Self::builder().build(transport)
    }

    /// Create a builder for a peer with custom options.
    pub fn builder() -> RpcPeerBuilder {
        RpcPeerBuilder::default()
    }

    pub fn with_options(transport: Arc<dyn Transport>, options: PeerOptions) -> Self {
        let registry = Arc::new(MethodRegistry::new());
        let pending = Arc::new(PendingCalls::new());
        let outbound = Outbound::new(transport, &options.label);
        let dispatcher = Dispatcher::new(
            registry.clone(),
            pending.clone(),
            outbound.clone(),
            options.reply_to_unmatched,
        );

        Self {
            inner: Arc::new(PeerInner {
                options,
                registry,
                pending,
                dispatcher,
                outbound,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn options(&self) -> &PeerOptions {
        &self.inner.options
    }

    pub fn role(&self) -> Role {
        self.inner.options.role
    }

    /// Merge a set of methods into the local registry.
    ///
    /// Safe at any time; requests for a name that arrive before it is
    /// registered are answered with `MethodNotFound`.
    pub fn register_methods(&self, methods: Methods) {
        debug!(side = %self.inner.options.label, count = methods.len(), "Registering methods");
        self.inner.registry.register(methods);
    }

    pub fn register(&self, name: impl Into<String>, handler: BoxedHandler) {
        self.inner.registry.register([(name.into(), handler)]);
    }

    /// Names of the locally registered methods, sorted.
    pub fn method_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Number of calls still waiting for a response or timeout.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Feed one inbound message to the dispatcher. Never panics.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_raw(&self, raw: Value) {
        self.inner.dispatcher.handle_raw(raw);
    }

    /// Call `method` on the other side.
    ///
    /// The request is sent before this returns; the future settles with the
    /// remote result, the remote error, or [`CallError::Timeout`] once
    /// `timeout` elapses. `params` serializing to an array is sent as the
    /// positional list, `()` sends no params, and any other value is sent as
    /// the single positional argument.
    ///
    /// Must be called from within a tokio runtime.
    pub fn call<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> impl Future<Output = Result<R, CallError>>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let started = encode_params(params)
            .map_err(CallError::from)
            .map(|params| self.start_call(method, params, timeout));

        async move {
            let value = started?.await?;
            Ok(serde_json::from_value(value)?)
        }
    }

    /// Untyped variant of [`RpcPeer::call`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn call_value(
        &self,
        method: &str,
        params: Option<Vec<Value>>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, CallError>> {
        self.start_call(method, params, timeout)
    }

    fn start_call(
        &self,
        method: &str,
        params: Option<Vec<Value>>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, CallError>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.inner.pending.insert(id, method, timeout);
        self.inner.outbound.send(Message::request(id, method, params));

        let method = method.to_string();
        async move {
            match rx.await {
                Ok(completion) => completion,
                // The table was dropped with the call still in it.
                Err(_) => Err(CallError::Closed { id, method }),
            }
        }
    }

    /// Send a notification. No reply is expected and delivery failures are
    /// only logged; the error case is a local encoding failure.
    pub fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), CallError> {
        let params = encode_params(params)?;
        self.inner.outbound.send(Message::notification(method, params));
        Ok(())
    }

    /// Run `method` wherever it lives.
    ///
    /// On a [`Role::Host`] the locally registered handler runs directly; on a
    /// [`Role::Remote`] the call goes over the transport with the configured
    /// default timeout.
    ///
    /// Must be awaited within a tokio runtime.
    pub async fn invoke<P, R>(&self, method: &str, params: P) -> Result<R, CallError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        match self.inner.options.role {
            Role::Host => {
                let params = encode_params(params)?;
                let value = self.inner.registry.invoke(method, params).await?;
                Ok(serde_json::from_value(value)?)
            }
            Role::Remote => {
                self.call(method, params, self.inner.options.default_timeout)
                    .await
            }
        }
    }

    /// Fail every outstanding call with [`CallError::Closed`].
    ///
    /// Returns the number of calls that were still waiting.
    pub fn close(&self) -> usize {
        let closed = self.inner.pending.close_all();
        if closed > 0 {
            info!(side = %self.inner.options.label, closed, "Closed outstanding calls");
        }
        closed
    }

    /// Non-owning handle for receive loops, so a loop never keeps its own
    /// peer alive.
    pub fn downgrade(&self) -> WeakRpcPeer {
        WeakRpcPeer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak counterpart of [`RpcPeer`].
#[derive(Clone)]
pub struct WeakRpcPeer {
    inner: Weak<PeerInner>,
}

impl WeakRpcPeer {
    /// `None` once every [`RpcPeer`] clone has been dropped.
    pub fn upgrade(&self) -> Option<RpcPeer> {
        self.inner.upgrade().map(|inner| RpcPeer { inner })
    }
}

impl std::fmt::Debug for RpcPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcPeer")
            .field("label", &self.inner.options.label)
            .field("role", &self.inner.options.role)
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

fn encode_params<P: Serialize>(params: P) -> serde_json::Result<Option<Vec<Value>>> {
    Ok(match serde_json::to_value(params)? {
        Value::Null => None,
        Value::Array(items) => Some(items),
        other => Some(vec![other]),
    })
}

/// Builder for [`RpcPeer`].
#[derive(Default, Clone)]
pub struct RpcPeerBuilder {
    options: PeerOptions,
    methods: Methods,
}

impl RpcPeerBuilder {
    /// Timeout used by [`RpcPeer::invoke`].
    ///
    /// Default: 3000ms
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.options.default_timeout = timeout;
        self
    }

    /// Default: [`Role::Remote`]
    pub fn role(mut self, role: Role) -> Self {
        self.options.role = role;
        self
    }

    /// Name of this side in log output.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.options.label = label.into();
        self
    }

    /// Reply to responses that match no pending call.
    ///
    /// Both sides number their calls from 0, so the diagnostic can settle an
    /// unrelated call on the other side. Only safe when this side makes no
    /// calls of its own.
    ///
    /// Default: `false`
    pub fn reply_to_unmatched(mut self, enable: bool) -> Self {
        self.options.reply_to_unmatched = enable;
        self
    }

    /// Methods registered before the peer handles its first message.
    pub fn methods(mut self, methods: Methods) -> Self {
        self.methods = self.methods.into_iter().chain(methods).collect();
        self
    }

    pub fn options(mut self, options: PeerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self, transport: impl Transport) -> RpcPeer {
        self.build_shared(Arc::new(transport))
    }

    pub fn build_shared(self, transport: Arc<dyn Transport>) -> RpcPeer {
        let peer = RpcPeer::with_options(transport, self.options);
        if !self.methods.is_empty() {
            peer.register_methods(self.methods);
        }
        peer
    }
}

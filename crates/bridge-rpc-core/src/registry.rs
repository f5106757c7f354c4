//! Method registry: name to async handler.
//!
//! Handlers share one dynamic shape, positional JSON params in and a JSON
//! value or [`RpcError`] out. Method-specific typing happens once, at
//! registration, through [`handler_fn`].

use crate::error::RpcError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// A locally invokable method.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Run the method with its positional params (empty when absent).
    async fn call(&self, params: Vec<Value>) -> Result<Value, RpcError>;
}

/// Shared handle to a registered handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Adapter from a typed async closure to [`Handler`].
pub struct FnHandler<F, P, R, E> {
    f: F,
    _marker: PhantomData<fn(P) -> (R, E)>,
}

/// Wrap a typed async closure as a handler.
///
/// The positional params are deserialized into `P`, so `(i64, i64)` takes two
/// integers and `()` takes none. A mismatch is answered with `InvalidParams`.
///
/// ```
/// use bridge_rpc_core::{handler_fn, RpcError};
///
/// let add = handler_fn(|(a, b): (i64, i64)| async move { Ok::<_, RpcError>(a + b) });
/// ```
pub fn handler_fn<F, P, R, E, Fut>(f: F) -> BoxedHandler
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<RpcError> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _marker: PhantomData,
    })
}

#[async_trait]
impl<F, P, R, E, Fut> Handler for FnHandler<F, P, R, E>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<RpcError> + Send + 'static,
{
    async fn call(&self, params: Vec<Value>) -> Result<Value, RpcError> {
        let params = decode_params::<P>(params)?;
        let result = (self.f)(params).await.map_err(Into::into)?;
        Ok(serde_json::to_value(result)?)
    }
}

// Zero-argument handlers take `()`, which serde reads from `null` rather than
// from an empty array.
fn decode_params<P: DeserializeOwned>(params: Vec<Value>) -> Result<P, RpcError> {
    if params.is_empty() {
        if let Ok(unit) = serde_json::from_value::<P>(Value::Null) {
            return Ok(unit);
        }
    }
    serde_json::from_value(Value::Array(params))
        .map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// A set of handlers to register in one go.
#[derive(Default, Clone)]
pub struct Methods {
    handlers: HashMap<String, BoxedHandler>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler, replacing any earlier one with the same name.
    pub fn with(mut self, name: impl Into<String>, handler: BoxedHandler) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl IntoIterator for Methods {
    type Item = (String, BoxedHandler);
    type IntoIter = std::collections::hash_map::IntoIter<String, BoxedHandler>;

    fn into_iter(self) -> Self::IntoIter {
        self.handlers.into_iter()
    }
}

impl FromIterator<(String, BoxedHandler)> for Methods {
    fn from_iter<I: IntoIterator<Item = (String, BoxedHandler)>>(iter: I) -> Self {
        Self {
            handlers: iter.into_iter().collect(),
        }
    }
}

/// Live mapping from method name to handler.
///
/// Registration is additive and there is no removal; registering a name again
/// replaces its handler.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: RwLock<HashMap<String, BoxedHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge handlers into the registry.
    pub fn register(&self, methods: impl IntoIterator<Item = (String, BoxedHandler)>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.extend(methods);
    }

    pub fn get(&self, name: &str) -> Option<BoxedHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Look up `name` and run it.
    ///
    /// The registry lock is released before the handler runs, so handlers may
    /// register further methods.
    pub async fn invoke(&self, name: &str, params: Option<Vec<Value>>) -> Result<Value, RpcError> {
        let Some(handler) = self.get(name) else {
            warn!(
                method = name,
                known = ?self.names(),
                "Method not found in registry"
            );
            return Err(RpcError::method_not_found(name));
        };
        handler.call(params.unwrap_or_default()).await
    }
}

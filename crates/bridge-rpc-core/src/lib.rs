//! Bridge RPC Core - bidirectional JSON-RPC 2.0 over a single message channel.
//!
//! Two isolated contexts (a host and a remote side) that can only exchange
//! structured messages each hold one [`RpcPeer`]. Either side can register
//! methods for the other to call and call the other side's methods; replies
//! are matched to callers by id, and every call settles exactly once with a
//! result, a structured error, or a timeout.
//!
//! The transport is injected: anything implementing [`Transport`] can carry
//! outbound messages, and inbound messages are fed to [`RpcPeer::handle_raw`].
//!
//! # Example
//!
//! ```rust,no_run
//! use bridge_rpc_core::{handler_fn, link, Methods, PeerOptions, RpcError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bridge_rpc_core::CallError> {
//!     let (host, remote) = link(PeerOptions::default(), PeerOptions::default());
//!
//!     host.register_methods(Methods::new().with(
//!         "add",
//!         handler_fn(|(a, b): (i64, i64)| async move { Ok::<_, RpcError>(a + b) }),
//!     ));
//!
//!     let sum: i64 = remote.call("add", (2, 3), Duration::from_secs(3)).await?;
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod pending;
pub mod peer;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use codec::{classify, Id, Inbound, Message};
pub use config::{PeerOptions, Role, RpcConfig};
pub use dispatcher::Dispatcher;
pub use error::{CallError, ErrorCode, RpcError, TransportError};
pub use peer::{RpcPeer, RpcPeerBuilder, WeakRpcPeer};
pub use registry::{handler_fn, BoxedHandler, Handler, MethodRegistry, Methods};
pub use transport::{attach, link, FramedTransport, MemoryTransport, Transport};

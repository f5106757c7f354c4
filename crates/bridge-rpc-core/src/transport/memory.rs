//! In-process transport over tokio channels.

use super::Transport;
use crate::codec::Message;
use crate::config::PeerOptions;
use crate::error::{Result, TransportError};
use crate::peer::RpcPeer;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sending half of an in-memory channel.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Message>,
}

impl MemoryTransport {
    /// Create a transport and the receiver that sees everything sent on it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for MemoryTransport {
    fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Deliver every message from `rx` to `peer` until the channel closes or the
/// peer is dropped.
///
/// Messages are re-encoded as JSON values so the peer sees exactly what a
/// structured-message transport would hand it. The task holds the peer weakly.
pub fn spawn_receiver(peer: &RpcPeer, mut rx: mpsc::UnboundedReceiver<Message>) -> JoinHandle<()> {
    let weak = peer.downgrade();
    let label = peer.options().label.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Some(peer) = weak.upgrade() else {
                break;
            };
            match message.to_value() {
                Ok(raw) => peer.handle_raw(raw),
                Err(e) => warn!(side = %label, error = %e, "Dropping message that failed to encode"),
            }
        }
        debug!(side = %label, "Memory receiver stopped");
    })
}

/// Wire two peers back to back.
///
/// Must be called from within a tokio runtime. The receive loops run as
/// background tasks and stop once either peer has been dropped; dropping both
/// releases both registries.
pub fn link(a: PeerOptions, b: PeerOptions) -> (RpcPeer, RpcPeer) {
    let (to_b, from_a) = MemoryTransport::channel();
    let (to_a, from_b) = MemoryTransport::channel();

    let peer_a = RpcPeer::with_options(Arc::new(to_b), a);
    let peer_b = RpcPeer::with_options(Arc::new(to_a), b);

    spawn_receiver(&peer_b, from_a);
    spawn_receiver(&peer_a, from_b);

    (peer_a, peer_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::error::RpcError;
    use crate::registry::{handler_fn, Methods};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (transport, rx) = MemoryTransport::channel();
        drop(rx);
        let result = transport.send(Message::notification("tick", None));
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_linked_peers_call_each_other() {
        let (host, remote) = link(
            PeerOptions {
                role: Role::Host,
                label: "host".into(),
                ..PeerOptions::default()
            },
            PeerOptions {
                label: "remote".into(),
                ..PeerOptions::default()
            },
        );
        host.register_methods(Methods::new().with(
            "add",
            handler_fn(|(a, b): (i64, i64)| async move { Ok::<_, RpcError>(a + b) }),
        ));
        remote.register_methods(Methods::new().with(
            "greet",
            handler_fn(|(name,): (String,)| async move { Ok::<_, RpcError>(format!("hi {name}")) }),
        ));

        let sum: i64 = remote
            .call("add", (2, 3), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(sum, 5);

        let greeting: String = host
            .call("greet", ("host",), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(greeting, "hi host");
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_linked_peers_releases_handlers() {
        let dropped = Arc::new(AtomicBool::new(false));
        let (host, remote) = link(PeerOptions::default(), PeerOptions::default());

        let flag = DropFlag(dropped.clone());
        host.register(
            "ping",
            handler_fn(move |(): ()| {
                let _held = &flag;
                async { Ok::<_, RpcError>("pong") }
            }),
        );

        let pong: String = remote
            .call("ping", (), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(pong, "pong");

        drop(host);
        drop(remote);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(dropped.load(Ordering::SeqCst));
    }
}

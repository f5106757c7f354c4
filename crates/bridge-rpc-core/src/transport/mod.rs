//! Transport seam.
//!
//! The RPC core only needs a way to push one message toward the other side;
//! delivery in the other direction happens by the transport calling
//! [`crate::RpcPeer::handle_raw`]. Two adapters ship with the crate:
//!
//! - [`memory`]: tokio channels, for wiring two peers in one process
//! - [`framed`]: length-prefixed JSON over any byte stream (TCP, pipes)

pub mod framed;
pub mod memory;

use crate::codec::Message;
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, error};

pub use framed::{attach, read_frame, read_loop, spawn_writer, write_frame, FramedTransport};
pub use memory::{link, spawn_receiver, MemoryTransport};

/// Outbound half of a message channel.
///
/// `send` may fail; the RPC core logs the failure and carries on as if the
/// message had been sent.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, message: Message) -> Result<()>;
}

impl<F> Transport for F
where
    F: Fn(Message) -> Result<()> + Send + Sync + 'static,
{
    fn send(&self, message: Message) -> Result<()> {
        self(message)
    }
}

/// Transport wrapper that logs traffic and swallows send failures.
#[derive(Clone)]
pub(crate) struct Outbound {
    transport: Arc<dyn Transport>,
    label: Arc<str>,
}

impl Outbound {
    pub(crate) fn new(transport: Arc<dyn Transport>, label: &str) -> Self {
        Self {
            transport,
            label: Arc::from(label),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn send(&self, message: Message) {
        debug!(
            side = %self.label,
            id = ?message.id(),
            method = message.method().unwrap_or("-"),
            "Sending message"
        );
        if let Err(e) = self.transport.send(message) {
            error!(side = %self.label, error = %e, "Failed to send message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_transport() {
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = sent.clone();
        let outbound = Outbound::new(
            Arc::new(move |_msg: Message| -> Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            "test",
        );

        outbound.send(Message::notification("tick", None));
        outbound.send(Message::notification("tick", None));
        assert_eq!(sent.load(Ordering::SeqCst), 2);
        assert_eq!(outbound.label(), "test");
    }

    #[test]
    fn test_send_failure_is_swallowed() {
        let outbound = Outbound::new(
            Arc::new(|_msg: Message| -> Result<()> { Err(TransportError::Closed) }),
            "test",
        );
        outbound.send(Message::notification("tick", None));
    }
}

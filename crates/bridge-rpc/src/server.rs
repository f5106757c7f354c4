//! TCP listener for the host side of the bridge.
//!
//! Each accepted connection gets its own [`RpcPeer`] in the host role, with
//! the method set from [`crate::methods::host_methods`]. Peers share nothing,
//! so ids and pending calls are per connection.

use crate::methods::host_methods;
use bridge_rpc_core::{attach, Role, RpcConfig, RpcPeer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Handle to a running listener. Dropping shuts it down.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and close every live one.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Bind to `host:port` and serve in background tasks.
///
/// Returns once the socket is bound; with `port = 0` the handle carries the
/// OS-assigned port.
pub async fn start_server(host: &str, port: u16) -> anyhow::Result<ServerHandle> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    info!("Bridge listening on {}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

    let task_handle = tokio::spawn(accept_loop(listener, shutdown_rx, conn_shutdown_rx));

    Ok(ServerHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        conn_shutdown_tx,
        task_handle: Some(task_handle),
    })
}

async fn accept_loop(
    listener: TcpListener,
    mut shutdown_rx: oneshot::Receiver<()>,
    conn_shutdown_rx: watch::Receiver<bool>,
) {
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Bridge shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        let current = active_connections.load(Ordering::Relaxed);
                        if current >= RpcConfig::MAX_CONNECTIONS {
                            warn!(
                                "Rejecting connection from {}: at max capacity ({})",
                                peer_addr,
                                RpcConfig::MAX_CONNECTIONS
                            );
                            continue;
                        }

                        active_connections.fetch_add(1, Ordering::Relaxed);
                        let conns = active_connections.clone();
                        let conn_shutdown = conn_shutdown_rx.clone();

                        tokio::spawn(async move {
                            handle_connection(stream, peer_addr, conn_shutdown).await;
                            conns.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("Connection from {}", peer_addr);
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let builder = RpcPeer::builder()
        .role(Role::Host)
        .label(peer_addr.to_string())
        .methods(host_methods());
    let (peer, mut task) = attach(stream, builder);

    tokio::select! {
        joined = &mut task => match joined {
            Ok(Ok(())) => debug!("Connection {} closed", peer_addr),
            Ok(Err(e)) => debug!("Connection {} ended: {}", peer_addr, e),
            Err(e) => warn!("Connection task for {} failed: {}", peer_addr, e),
        },
        _ = shutdown_rx.changed() => {
            task.abort();
            peer.close();
            debug!("Connection {} closed by shutdown", peer_addr);
        }
    }
}

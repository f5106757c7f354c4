//! Bridge RPC - command-line ends of a JSON-RPC 2.0 bridge over TCP.
//!
//! `listen` runs the host side and serves the built-in methods to every
//! connection. `call` runs the remote side for a single request and prints
//! the outcome.

mod methods;
mod server;

use anyhow::{Context, Result};
use bridge_rpc_core::{attach, CallError, Role, RpcConfig, RpcPeer};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "bridge-rpc")]
#[command(about = "Bidirectional JSON-RPC bridge over TCP")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the host side on a TCP port
    Listen {
        /// Port to listen on (0 = auto-assign)
        #[arg(short, long, default_value = "0")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Call one method on a listening bridge and print the result
    Call {
        /// Address of the listening bridge
        #[arg(long)]
        addr: SocketAddr,

        /// Method name
        method: String,

        /// Params as JSON; an array is sent as the positional list
        params: Option<String>,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; stdout is reserved for RPC_PORT and call results
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match args.command {
        Command::Listen { port, host } => listen(&host, port).await,
        Command::Call {
            addr,
            method,
            params,
            timeout_ms,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(RpcConfig::DEFAULT_CALL_TIMEOUT);
            call(addr, &method, params.as_deref(), timeout).await
        }
    }
}

async fn listen(host: &str, port: u16) -> Result<()> {
    info!("Starting bridge host");

    let mut handle = server::start_server(host, port).await?;

    // Print port for the launching process to read (intentional stdout)
    println!("RPC_PORT={}", handle.addr().port());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    handle.shutdown();

    Ok(())
}

async fn call(addr: SocketAddr, method: &str, params: Option<&str>, timeout: Duration) -> Result<()> {
    let params: Value = match params {
        Some(raw) => serde_json::from_str(raw).context("params must be valid JSON")?,
        None => Value::Null,
    };

    let stream = tokio::time::timeout(RpcConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .with_context(|| format!("timed out connecting to {}", addr))?
        .with_context(|| format!("failed to connect to {}", addr))?;
    debug!("Connected to {}", addr);

    let builder = RpcPeer::builder()
        .role(Role::Remote)
        .label("cli")
        .default_timeout(timeout);
    let (peer, _task) = attach(stream, builder);

    match peer.call::<_, Value>(method, params, timeout).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(CallError::Rpc(error)) => {
            println!("{}", serde_json::to_string_pretty(&error)?);
            Err(CallError::Rpc(error).into())
        }
        Err(e) => Err(e.into()),
    }
}

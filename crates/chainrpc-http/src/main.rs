//! chainrpc-http - serves the demo user directory over HTTP.

use anyhow::Result;
use chainrpc::config::ServerConfig;
use chainrpc_http::demo::{self, UserStore};
use chainrpc_http::start_server;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "chainrpc-http")]
#[command(about = "Demo chainrpc server for an in-memory user directory")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = ServerConfig::DEFAULT_HOST)]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting chainrpc demo server");

    let dispatcher = demo::dispatcher(Arc::new(UserStore::new()))?;
    let addr = start_server(dispatcher, &args.host, args.port).await?;

    // Machine-readable port for scripts that spawn the server
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}

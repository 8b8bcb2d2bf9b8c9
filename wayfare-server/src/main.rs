//! Wayfare reference API server.
//!
//! Serves the trip and item mutation API from memory. Useful for local
//! development against a real HTTP endpoint.
//!
//! Usage:
//!   wayfare-server --port 8787

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use wayfare_server::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "wayfare-server")]
#[command(about = "Wayfare trip and item mutation API")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8787")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Wayfare API listening on {}", addr);

    axum::serve(listener, build_router(AppState::new()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}

//! Analysis Gateway
//!
//! Accepts document-analysis requests, routes each one to an authorized
//! version of the external analysis service, and keeps a complete audit
//! trail of every request.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client (multipart)        ┌──────────────────────────────────────────────────┐
//!     ──────────────────────────┼─▶ http (auth, intake) ─▶ pipeline               │
//!                               │                          │                       │
//!                               │      routing (resolve) ◀─┤                       │
//!                               │      options (inject)  ◀─┤                       │
//!                               │                          ▼                       │
//!                               │                    invoker ──────────────────────┼──▶ Analysis
//!                               │                          │                       │    backend
//!     Client Response           │                          ▼                       │
//!     ◀─────────────────────────┼── response ◀── filter (per-user fields)          │
//!                               │                                                  │
//!                               │  Terminal steps (every request):                 │
//!                               │    summary row → RowSink                         │
//!                               │    session snapshot → AuditStore                 │
//!                               │    staged files released                         │
//!                               └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use analysis_gateway::config::load_config;
use analysis_gateway::http::{default_collaborators, GatewayServer};
use analysis_gateway::lifecycle::{signals, startup, Shutdown};
use analysis_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "analysis-gateway", version, about = "Multi-version analysis gateway")]
struct Args {
    /// Path to the gateway configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "analysis-gateway starting");
    tracing::info!(
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        default_version = %config.default_version,
        backends = config.backends.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let directory = startup::load_directory(&config.users)?;
    let _watcher = startup::start_directory_watcher(&config.users, directory.clone());

    tokio::fs::create_dir_all(&config.uploads.staging_dir).await?;
    let (audit, rows) = default_collaborators(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = GatewayServer::new(config, directory, audit, rows)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

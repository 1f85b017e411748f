//! Guck MCP Server Binary
//!
//! ## Usage
//!
//! ```bash
//! # Run as MCP server (stdio), config discovered from the repo root
//! guck-mcp
//!
//! # Explicit config and store directory
//! guck-mcp --config ./.guck.json --dir /var/log/guck
//! ```

use std::path::PathBuf;

use clap::Parser;
use guck_core::{load_config, LoadOptions};
use guck_mcp::McpServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "guck-mcp", version, about = "MCP server for searching guck telemetry")]
struct Args {
    /// Path to .guck.json (or a directory containing one)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event store directory (overrides GUCK_DIR)
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guck_mcp=info,guck_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Guck MCP Server v{}", env!("CARGO_PKG_VERSION"));

    let mut options = LoadOptions::from_process();
    if let Some(path) = args.config {
        options = options.with_config_path(path);
    }
    let mut loaded = load_config(&options);
    if let Some(dir) = args.dir {
        loaded.store_dir = dir;
    }

    match &loaded.config_path {
        Some(path) => tracing::info!("Using config {}", path.display()),
        None => tracing::info!("No .guck.json found under {}, using defaults", loaded.root_dir.display()),
    }
    tracing::info!("Event store: {}", loaded.store_dir.display());

    let server = McpServer::from_config(&loaded);
    for backend in server.engine().aggregator().backends() {
        tracing::info!("Backend {} ({})", backend.id(), backend.kind());
    }

    tracing::info!("MCP server ready, listening on stdio");
    server.run_stdio().await?;

    Ok(())
}

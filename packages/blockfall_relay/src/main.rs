use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::Serialized;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use blockfall_relay::{FileConfig, RelayConfig, load_config};

#[derive(Parser)]
#[command(name = "blockfall-relay")]
#[command(about = "Session relay for multiplayer blockfall")]
struct Args {
    /// Config file (defaults to ./blockfall.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the web server (0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Directory of static client assets
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Flags given on the command line; merged last so they win over every file
/// and env layer.
#[derive(Serialize)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "blockfall_relay=debug,tower_http=debug,info"
    } else {
        "blockfall_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let overrides = CliOverrides {
        host: args.host,
        port: args.port,
        static_dir: args.static_dir,
    };
    let file_config: FileConfig = load_config(args.config.as_deref())
        .merge(Serialized::default("server", overrides))
        .extract()
        .context("Failed to load configuration")?;
    let config = RelayConfig::from_file(&file_config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing connections...");
    };

    blockfall_relay::serve(listener, config, shutdown_signal).await?;
    info!("Shutdown complete");
    Ok(())
}

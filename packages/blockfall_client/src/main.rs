use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::prelude::*;

use blockfall_client::{PlayOptions, SessionIntent, relay_url};

#[derive(Parser)]
#[command(name = "blockfall")]
#[command(about = "Play blockfall headlessly, sharing the game through a relay session")]
struct Args {
    /// Relay host
    #[arg(long, default_value = "localhost")]
    relay_host: String,

    /// Relay port
    #[arg(long, default_value = "3000")]
    relay_port: u16,

    /// Connect with wss:// instead of ws://
    #[arg(long)]
    secure: bool,

    /// Join an existing session instead of creating one
    #[arg(long)]
    join: Option<String>,

    /// Skip the relay and play locally
    #[arg(long)]
    offline: bool,

    /// Give up on the relay after this many milliseconds
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// Seed for the piece sequence and the auto-player
    #[arg(long)]
    seed: Option<u64>,

    /// Simulation tick in milliseconds
    #[arg(long, default_value = "50")]
    tick_ms: u64,

    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "blockfall_client=debug,blockfall=debug,info"
    } else {
        "blockfall_client=info,blockfall=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let opts = PlayOptions {
        relay_url: (!args.offline).then(|| relay_url(&args.relay_host, args.relay_port, args.secure)),
        intent: match args.join {
            Some(id) => SessionIntent::Join(id),
            None => SessionIntent::Create,
        },
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        seed: args.seed,
        tick: Duration::from_millis(args.tick_ms.max(1)),
        report_every: Duration::from_secs(5),
        duration: args.duration_secs.map(Duration::from_secs),
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            ctrl_c.cancel();
        }
    });

    let summary = blockfall_client::run(opts, cancel).await;
    info!(
        score = summary.score,
        session = summary.session_id.as_deref().unwrap_or("-"),
        peers = summary.peers.len(),
        ticks = summary.ticks,
        "Game over"
    );
    for (peer, score) in &summary.peers {
        info!(peer = %peer, score = ?score, "Final peer score");
    }
    Ok(())
}

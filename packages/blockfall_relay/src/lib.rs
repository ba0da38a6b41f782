//! Session relay for blockfall.
//!
//! Players connect over a WebSocket at `/ws`, create or join a short-lived
//! session and have their game state fanned out to everyone else in it. The
//! relay never interprets the state it forwards.

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod session;

pub use config::{FileConfig, RelayConfig, load_config};
pub use connection::{Connection, ConnectionId, ConnectionPhase, Outbound, StatePayload};
pub use error::RelayError;
pub use metrics::{HealthStatus, MetricsSnapshot, RelayMetrics};
pub use relay::{Relay, RelayEvent, RelayHandle};
pub use server::{AppState, router};
pub use session::{Session, SessionId, SessionRegistry};

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Runs the relay on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, config: RelayConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics = Arc::new(RelayMetrics::new());
    let relay = Relay::new(SessionRegistry::new(config.session_id_len), metrics.clone()).spawn();
    let static_dir = config.static_dir.clone();
    let state = AppState {
        relay,
        metrics,
        config: Arc::new(config),
    };
    let app = router(state, &static_dir);

    let addr = listener.local_addr()?;
    info!("Blockfall relay listening on http://{}", addr);
    info!("  WS   /ws       - game session relay");
    info!("  GET  /health   - health status");
    info!("  GET  /metrics  - relay counters");
    info!("  GET  /*        - static files from {}", static_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::connection::Outbound;
use crate::metrics::{HealthStatus, RelayMetrics};
use crate::relay::RelayHandle;

#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub metrics: Arc<RelayMetrics>,
    pub config: Arc<RelayConfig>,
}

/// Tags every HTTP request span with a fresh request id.
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %Uuid::new_v4(),
        )
    }
}

/// `/ws` for players, `/health` and `/metrics` for operators, and everything
/// else from `static_dir`.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Health check endpoint - returns relay status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(HealthStatus {
        status: "healthy".to_string(),
        connections: snapshot.connections.active,
        sessions: snapshot.sessions.active,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed relay counters
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Pumps one socket: outbound envelopes from the relay go to the client,
/// inbound text frames go to the relay. Whichever side ends first ends both,
/// and the relay is told about the close exactly once.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.outbound_buffer);
    let conn_id = match state.relay.connect(tx).await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to register connection: {}", e);
            return;
        }
    };
    debug!(conn_id = %conn_id, "WebSocket connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let sender_task = async {
        while let Some(envelope) = rx.recv().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize envelope: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    let max_message_bytes = state.config.max_message_bytes;
    let input_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if text.len() > max_message_bytes {
                        warn!(
                            conn_id = %conn_id,
                            len = text.len(),
                            "Dropping oversized frame"
                        );
                        state.metrics.envelope_dropped();
                        continue;
                    }
                    if state
                        .relay
                        .deliver(&conn_id, text.as_str().to_owned())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %conn_id, "Client closed connection");
                    break;
                }
                Err(e) => {
                    debug!(conn_id = %conn_id, "WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %conn_id, "Sender task ended"),
        _ = input_task => debug!(conn_id = %conn_id, "Input task ended"),
    }

    if let Err(e) = state.relay.close(&conn_id).await {
        warn!(conn_id = %conn_id, "Failed to report close: {}", e);
    }
}

//! WebSocket link to a relay.
//!
//! The socket is owned by two background tasks; callers only see a pair of
//! channels, so a slow or dead relay never stalls the game loop.

use std::time::Duration;

use blockfall_core::{
    ClientEnvelope, EnvelopeError, SerializedGameState, ServerEnvelope, parse_server_envelope,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ClientError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const LINK_BUFFER: usize = 256;

pub type ClientMessage = ClientEnvelope<SerializedGameState>;
pub type ServerMessage = ServerEnvelope<SerializedGameState>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay endpoint for `host:port`, `wss://` when `secure`.
pub fn relay_url(host: &str, port: u16, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}:{port}/ws")
}

#[derive(Debug)]
pub enum LinkEvent {
    Envelope(ServerMessage),
    /// The socket is gone; no further events follow.
    Closed,
}

pub struct RelayLink {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<LinkEvent>,
    cancel: CancellationToken,
}

impl RelayLink {
    /// Opens a link, giving up after `timeout` or as soon as `cancel` fires.
    pub async fn connect(
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self, ClientError> {
        debug!(url, "Connecting to relay");
        let ws = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            res = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)) => match res {
                Err(_) => return Err(ClientError::Timeout(timeout)),
                Ok(Err(e)) => return Err(ClientError::from_tungstenite(e)),
                Ok(Ok((ws, _response))) => ws,
            },
        };
        info!(url, "Connected to relay");
        Ok(Self::spawn(ws, cancel.child_token()))
    }

    fn spawn(ws: WsStream, cancel: CancellationToken) -> Self {
        let (mut ws_write, mut ws_read) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientMessage>(LINK_BUFFER);
        let (inbound_tx, inbound) = mpsc::channel::<LinkEvent>(LINK_BUFFER);

        let writer_cancel = cancel.clone();
        let writer_events = inbound_tx.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    msg = outbound_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize envelope: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_write.send(tungstenite::Message::Text(json.into())).await {
                    debug!("Relay write failed: {}", e);
                    let _ = writer_events.send(LinkEvent::Closed).await;
                    return;
                }
            }
            let _ = ws_write.close().await;
        });

        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = reader_cancel.cancelled() => return,
                    frame = ws_read.next() => frame,
                };
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match parse_server_envelope::<SerializedGameState>(text.as_str()) {
                            Ok(envelope) => {
                                if inbound_tx.send(LinkEvent::Envelope(envelope)).await.is_err() {
                                    return;
                                }
                            }
                            Err(EnvelopeError::UnknownKind(kind)) => {
                                debug!(kind = %kind, "Ignoring unknown envelope type");
                            }
                            Err(e) => warn!("Dropping malformed envelope from relay: {}", e),
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Relay read failed: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            info!("Relay link closed");
            let _ = inbound_tx.send(LinkEvent::Closed).await;
        });

        Self {
            outbound,
            inbound,
            cancel,
        }
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ClientError::LinkClosed)
    }

    /// Next event from the relay; `None` once both link tasks are gone.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.inbound.recv().await
    }
}

impl Drop for RelayLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

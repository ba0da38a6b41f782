use std::time::Duration;

use blockfall_core::{BoardShape, DEFAULT_HEIGHT, DEFAULT_WIDTH, Game};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::autoplay::AutoPlayer;
use crate::controller::{ClientSessionController, SessionIntent};
use crate::error::ClientError;
use crate::link::{LinkEvent, RelayLink};

#[derive(Debug, Clone)]
pub struct PlayOptions {
    /// `None` plays offline without trying the relay.
    pub relay_url: Option<String>,
    pub intent: SessionIntent,
    pub connect_timeout: Duration,
    pub seed: Option<u64>,
    pub tick: Duration,
    pub report_every: Duration,
    /// Stop after this long; `None` runs until cancelled.
    pub duration: Option<Duration>,
}

/// Where things stood when play stopped.
#[derive(Debug, Clone)]
pub struct PlaySummary {
    pub score: u64,
    pub session_id: Option<String>,
    pub peers: Vec<(String, Option<u64>)>,
    /// Simulation ticks the local game ran.
    pub ticks: u64,
    /// Change events the local game emitted.
    pub events: u64,
}

/// Plays until `cancel` fires or `duration` elapses. The local game runs
/// whether or not the relay is reachable.
pub async fn run(opts: PlayOptions, cancel: CancellationToken) -> PlaySummary {
    let (mut game, mut events) = match opts.seed {
        Some(seed) => Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, seed),
        None => Game::new(DEFAULT_WIDTH, DEFAULT_HEIGHT),
    };
    let mut autoplayer = AutoPlayer::new(opts.seed);
    let mut controller = ClientSessionController::new(BoardShape::default());

    let mut link = match &opts.relay_url {
        Some(url) => match RelayLink::connect(url, opts.connect_timeout, &cancel).await {
            Ok(link) => {
                let hello = controller.begin(opts.intent.clone(), &game);
                match link.send(hello).await {
                    Ok(()) => Some(link),
                    Err(e) => {
                        warn!("Relay link failed, playing offline: {}", e);
                        None
                    }
                }
            }
            Err(ClientError::Cancelled) => None,
            Err(e) => {
                warn!(url = %url, "Relay unreachable, playing offline: {}", e);
                None
            }
        },
        None => None,
    };

    let deadline = opts.duration.map(|d| Instant::now() + d);
    let stop = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop);

    let mut tick = tokio::time::interval(opts.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report = tokio::time::interval(opts.report_every);
    let mut last = Instant::now();
    let mut ticks = 0u64;
    let mut event_count = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut stop => break,
            event = next_link_event(&mut link) => match event {
                Some(LinkEvent::Envelope(envelope)) => {
                    controller.on_server_envelope(envelope);
                    // join-failed: keep playing without the relay.
                    if !controller.is_online() {
                        link = None;
                    }
                }
                Some(LinkEvent::Closed) | None => {
                    controller.on_disconnected();
                    link = None;
                }
            },
            now = tick.tick() => {
                let elapsed = now.duration_since(last).as_millis() as u64;
                last = now;
                autoplayer.step(&mut game);
                game.update(elapsed);
                ticks += 1;

                while let Ok(event) = events.try_recv() {
                    event_count += 1;
                    let Some(msg) = controller.on_game_event(event, &game) else {
                        continue;
                    };
                    let Some(active) = &link else {
                        continue;
                    };
                    if active.send(msg).await.is_err() {
                        controller.on_disconnected();
                        link = None;
                    }
                }
            },
            _ = report.tick() => {
                info!(
                    score = game.player().score,
                    session = controller.session_id().unwrap_or("-"),
                    peers = controller.peers().count(),
                    "Status"
                );
                for peer in controller.peers() {
                    info!(peer = %peer.id(), score = ?peer.score(), "Peer");
                }
            },
        }
    }

    PlaySummary {
        score: game.player().score,
        session_id: controller.session_id().map(str::to_owned),
        peers: controller
            .peers()
            .map(|p| (p.id().to_string(), p.score()))
            .collect(),
        ticks,
        events: event_count,
    }
}

async fn next_link_event(link: &mut Option<RelayLink>) -> Option<LinkEvent> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

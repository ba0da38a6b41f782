//! Relay counters for the health and metrics endpoints.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Relay-wide metrics. Gauges are written only by the relay task; counters
/// may be bumped from socket tasks too.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently registered connections
    pub active_connections: AtomicU64,
    /// Total connections since start
    pub total_connections: AtomicU64,

    // Session metrics
    /// Sessions currently in the registry
    pub active_sessions: AtomicU64,
    /// Total sessions created since start
    pub sessions_created: AtomicU64,
    pub failed_joins: AtomicU64,

    // Envelope metrics
    /// Text frames handed to the relay
    pub envelopes_received: AtomicU64,
    /// Envelopes queued to a recipient
    pub envelopes_sent: AtomicU64,
    /// Envelopes dropped: full/closed queue, oversize frame, or wrong state
    pub envelopes_dropped: AtomicU64,
    /// Frames that failed to parse
    pub malformed_envelopes: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn session_created(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_destroyed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn join_failed(&self) {
        self.failed_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn envelope_received(&self) {
        self.envelopes_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn envelopes_sent(&self, count: u64) {
        self.envelopes_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn envelope_dropped(&self) {
        self.envelopes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn envelope_malformed(&self) {
        self.malformed_envelopes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            sessions: SessionMetrics {
                active: self.active_sessions.load(Ordering::Relaxed),
                created: self.sessions_created.load(Ordering::Relaxed),
                failed_joins: self.failed_joins.load(Ordering::Relaxed),
            },
            envelopes: EnvelopeMetrics {
                received: self.envelopes_received.load(Ordering::Relaxed),
                sent: self.envelopes_sent.load(Ordering::Relaxed),
                dropped: self.envelopes_dropped.load(Ordering::Relaxed),
                malformed: self.malformed_envelopes.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub sessions: SessionMetrics,
    pub envelopes: EnvelopeMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub active: u64,
    pub created: u64,
    pub failed_joins: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub malformed: u64,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub sessions: u64,
    pub uptime_secs: u64,
}

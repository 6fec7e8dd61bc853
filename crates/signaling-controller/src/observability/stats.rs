//! Core counters for monitoring and the `/stats` endpoint.
//!
//! Cheap atomics, shared across components; also emitted through the
//! `metrics` facade so the Prometheus exporter picks them up. Room and
//! participant counts come from the room store at snapshot time; the
//! counters here track flow, not state.

use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared flow counters.
#[derive(Debug, Default)]
pub struct CoreStats {
    connections_open: AtomicU64,
    messages_routed: AtomicU64,
    deliveries_dropped: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub connections_open: u64,
    pub messages_routed: u64,
    pub deliveries_dropped: u64,
}

impl CoreStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_open.fetch_add(1, Ordering::Relaxed);
        counter!("sc_connections_opened_total").increment(1);
    }

    pub fn connection_closed(&self) {
        // Saturating: a close without a matching open is a bug elsewhere,
        // not a reason to wrap around.
        let _ = self
            .connections_open
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        counter!("sc_connections_closed_total").increment(1);
    }

    pub fn message_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
        counter!("sc_messages_routed_total").increment(1);
    }

    pub fn delivery_dropped(&self) {
        self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
        counter!("sc_deliveries_dropped_total").increment(1);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_open: self.connections_open.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
        }
    }
}

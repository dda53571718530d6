//! Process-wide driver counters.
//!
//! Counters are kept as atomics so the status report can read a consistent
//! snapshot, and every bump is mirrored to the `metrics` facade for whatever
//! recorder the host process installs.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

static DESCRIBE: Once = Once::new();

/// Monotonic counters shared by every slot of a driver
#[derive(Debug, Default)]
pub struct StatsCounters {
    connects: AtomicU64,
    publications: AtomicU64,
    basic_returns: AtomicU64,
    inbound_methods: AtomicU64,
    inbound_heartbeats: AtomicU64,
    live_slots: AtomicU64,
}

/// Point-in-time copy of [`StatsCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connects: u64,
    pub publications: u64,
    pub basic_returns: u64,
    pub inbound_methods: u64,
    pub inbound_heartbeats: u64,
    pub live_slots: u64,
}

impl StatsCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::register_metrics();
        Self::default()
    }

    /// Register metric descriptions
    fn register_metrics() {
        DESCRIBE.call_once(|| {
            describe_counter!(
                "rabbitmq_driver_connects_total",
                "Total number of broker connect attempts"
            );
            describe_counter!(
                "rabbitmq_driver_publications_total",
                "Total number of records accepted by basic.publish"
            );
            describe_counter!(
                "rabbitmq_driver_basic_returns_total",
                "Total number of unroutable records returned by the broker"
            );
            describe_counter!(
                "rabbitmq_driver_inbound_methods_total",
                "Total number of method frames received from the broker"
            );
            describe_counter!(
                "rabbitmq_driver_inbound_heartbeats_total",
                "Total number of heartbeat frames received from the broker"
            );
            describe_gauge!(
                "rabbitmq_driver_live_slots",
                "Current number of allocated driver slots"
            );
        });
    }

    /// Record a connect attempt
    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        counter!("rabbitmq_driver_connects_total").increment(1);
    }

    /// Record a successful basic.publish
    pub fn record_publication(&self) {
        self.publications.fetch_add(1, Ordering::Relaxed);
        counter!("rabbitmq_driver_publications_total").increment(1);
    }

    /// Record a basic.return
    pub fn record_basic_return(&self) {
        self.basic_returns.fetch_add(1, Ordering::Relaxed);
        counter!("rabbitmq_driver_basic_returns_total").increment(1);
    }

    /// Record an inbound method frame
    pub fn record_inbound_method(&self) {
        self.inbound_methods.fetch_add(1, Ordering::Relaxed);
        counter!("rabbitmq_driver_inbound_methods_total").increment(1);
    }

    /// Record an inbound heartbeat
    pub fn record_inbound_heartbeat(&self) {
        self.inbound_heartbeats.fetch_add(1, Ordering::Relaxed);
        counter!("rabbitmq_driver_inbound_heartbeats_total").increment(1);
    }

    /// A slot was allocated
    pub fn increment_live_slots(&self) {
        self.live_slots.fetch_add(1, Ordering::Relaxed);
        gauge!("rabbitmq_driver_live_slots").increment(1.0);
    }

    /// A slot was released
    ///
    /// Saturates at zero; returns `false` (and leaves the gauge alone) when
    /// there was nothing to decrement.
    pub fn decrement_live_slots(&self) -> bool {
        let decremented = self
            .live_slots
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if decremented {
            gauge!("rabbitmq_driver_live_slots").decrement(1.0);
        }
        decremented
    }

    /// Read every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            publications: self.publications.load(Ordering::Relaxed),
            basic_returns: self.basic_returns.load(Ordering::Relaxed),
            inbound_methods: self.inbound_methods.load(Ordering::Relaxed),
            inbound_heartbeats: self.inbound_heartbeats.load(Ordering::Relaxed),
            live_slots: self.live_slots.load(Ordering::Relaxed),
        }
    }
}

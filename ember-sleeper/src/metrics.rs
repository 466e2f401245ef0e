//! Sleeper-side counters. Approximate, relaxed ordering.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct SleeperMetrics {
    /// Status requests answered with the synthetic response.
    pub status_served: AtomicU64,
    /// Ping packets echoed.
    pub pings_echoed: AtomicU64,
    /// Login attempts answered with a kick.
    pub logins_kicked: AtomicU64,
    /// Wakes triggered from a login.
    pub wakes_triggered: AtomicU64,
    /// Connections dropped for protocol violations.
    pub protocol_errors: AtomicU64,
}

impl SleeperMetrics {
    const fn new() -> Self {
        Self {
            status_served: AtomicU64::new(0),
            pings_echoed: AtomicU64::new(0),
            logins_kicked: AtomicU64::new(0),
            wakes_triggered: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
        }
    }

    pub fn record_status_served(&self) {
        self.status_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ping_echoed(&self) {
        self.pings_echoed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_login_kicked(&self) {
        self.logins_kicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_triggered(&self) {
        self.wakes_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }
}

static METRICS: Lazy<SleeperMetrics> = Lazy::new(SleeperMetrics::new);

pub fn metrics() -> &'static SleeperMetrics {
    &METRICS
}

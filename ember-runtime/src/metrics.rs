//! Lightweight metrics counters.
//!
//! Atomic counters with relaxed ordering; approximate gauges read
//! periodically for logs and the operator API, so strict ordering isn't
//! needed.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Metrics {
    /// Wake operations started.
    pub wakes_started: AtomicU64,
    /// Wake operations that aborted with an error.
    pub wake_failures: AtomicU64,
    /// Servers torn down by the idle reaper.
    pub reaped_idle: AtomicU64,
    /// Servers force-reclaimed by the stuck reaper.
    pub reaped_stuck: AtomicU64,
    /// Full billing intervals deducted.
    pub billed_intervals: AtomicU64,
    /// Teardowns triggered by insufficient credit.
    pub billing_shutdowns: AtomicU64,
    /// Heartbeats accepted.
    pub heartbeats: AtomicU64,
    /// Status pings answered by the sleeper.
    pub status_pings: AtomicU64,
    /// Login attempts answered with a kick.
    pub logins_kicked: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            wakes_started: AtomicU64::new(0),
            wake_failures: AtomicU64::new(0),
            reaped_idle: AtomicU64::new(0),
            reaped_stuck: AtomicU64::new(0),
            billed_intervals: AtomicU64::new(0),
            billing_shutdowns: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            status_pings: AtomicU64::new(0),
            logins_kicked: AtomicU64::new(0),
        }
    }

    pub fn record_wake_started(&self) {
        self.wakes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_failure(&self) {
        self.wake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaped_idle(&self) {
        self.reaped_idle.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaped_stuck(&self) {
        self.reaped_stuck.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_billed_intervals(&self, intervals: u64) {
        self.billed_intervals.fetch_add(intervals, Ordering::Relaxed);
    }

    pub fn record_billing_shutdown(&self) {
        self.billing_shutdowns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_ping(&self) {
        self.status_pings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_login_kicked(&self) {
        self.logins_kicked.fetch_add(1, Ordering::Relaxed);
    }
}

static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

pub fn metrics() -> &'static Metrics {
    &METRICS
}

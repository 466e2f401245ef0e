//! Periodic job scheduler.
//!
//! Each reconciliation job runs as its own spawned loop. The cadence comes
//! from an optional cron expression, falling back to a fixed interval.
//! Ticks are idempotent, so an overlapping external trigger (the cron
//! endpoints in `api`) is harmless. A single active scheduler is assumed;
//! running several without a distributed lock is an inherited risk.

use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::billing::billing_tick;
use crate::reaper::{idle_tick, stuck_tick};
use crate::runtime::Runtime;

#[derive(Clone, Copy, Debug)]
enum Job {
    Billing,
    Idle,
    Stuck,
}

impl Job {
    fn name(self) -> &'static str {
        match self {
            Job::Billing => "billing",
            Job::Idle => "idle",
            Job::Stuck => "stuck",
        }
    }
}

/// Delay until the next tick: cron expression when configured and valid,
/// fixed interval otherwise.
fn next_delay(cron_expr: Option<&str>, fallback_secs: u64) -> Duration {
    if let Some(expr) = cron_expr {
        match Schedule::from_str(expr) {
            Ok(schedule) => {
                let now = Utc::now();
                if let Some(next) = schedule.after(&now).next() {
                    let secs = (next.timestamp() - now.timestamp()).max(1) as u64;
                    return Duration::from_secs(secs);
                }
                warn!("scheduler: cron expression {expr} has no future runs");
            }
            Err(err) => warn!("scheduler: invalid cron expression {expr}: {err}"),
        }
    }
    Duration::from_secs(fallback_secs.max(1))
}

async fn run(job: Job, rt: &Runtime) {
    match job {
        Job::Billing => billing_tick(rt).await,
        Job::Idle => idle_tick(rt).await,
        Job::Stuck => stuck_tick(rt).await,
    }
}

/// Spawn the three reconciliation loops.
pub fn spawn_jobs(rt: Arc<Runtime>) -> Vec<JoinHandle<()>> {
    let jobs = [
        (
            Job::Billing,
            rt.config.billing_cron.clone(),
            rt.config.billing_sweep_secs,
        ),
        (Job::Idle, rt.config.idle_cron.clone(), rt.config.idle_sweep_secs),
        (
            Job::Stuck,
            rt.config.stuck_cron.clone(),
            rt.config.stuck_sweep_secs,
        ),
    ];

    jobs.into_iter()
        .map(|(job, cron_expr, fallback_secs)| {
            let rt = rt.clone();
            tokio::spawn(async move {
                info!(
                    "scheduler: {} sweep started (cron: {}, fallback: {fallback_secs}s)",
                    job.name(),
                    cron_expr.as_deref().unwrap_or("none"),
                );
                loop {
                    let delay = next_delay(cron_expr.as_deref(), fallback_secs);
                    tokio::time::sleep(delay).await;
                    run(job, &rt).await;
                }
            })
        })
        .collect()
}

//! Reapers enforcing lifecycle invariants.
//!
//! - `idle_tick()`: tears down Running servers with no players past their
//!   auto-stop timeout
//! - `stuck_tick()`: force-reclaims servers wedged in Initializing/Starting
//! - `reconcile_on_startup()`: syncs store state with compute reality

use tracing::{error, info, warn};

use crate::dns::repoint;
use crate::metrics::metrics;
use crate::provision::{TeardownOutcome, TeardownTrigger, force_teardown, teardown};
use crate::runtime::Runtime;
use crate::server::ServerStatus;
use crate::util::now_ts;

/// Stop Running servers that have been empty past their auto-stop timeout.
/// The final partial interval is billed inside the teardown path, and the
/// Running -> Stopping CAS makes an overlapping sweep a no-op.
pub async fn idle_tick(rt: &Runtime) {
    let now = now_ts();
    let records = match rt.servers.values() {
        Ok(v) => v,
        Err(err) => {
            error!("idle reaper: failed to read servers: {err}");
            return;
        }
    };

    for record in records {
        if record.status != ServerStatus::Running {
            continue;
        }
        let empty_since = match record.last_empty_at {
            Some(ts) => ts,
            None => continue,
        };
        let timeout = record.auto_stop_timeout_minutes * 60;
        if timeout == 0 || empty_since + timeout > now {
            continue;
        }

        info!(
            "idle reaper: stopping server {} (empty for {}s, timeout {}s)",
            record.id,
            now.saturating_sub(empty_since),
            timeout
        );
        match teardown(rt, &record.id, TeardownTrigger::Idle).await {
            Ok(TeardownOutcome::TornDown) => metrics().record_reaped_idle(),
            Ok(TeardownOutcome::Skipped) => {}
            Err(err) => error!("idle reaper: teardown of {} failed: {err}", record.id),
        }
    }
}

/// Force-reclaim servers stuck in Initializing/Starting past the grace
/// window with a VM allocated. The VM is assumed unresponsive: no graceful
/// shutdown, delete directly, reset DNS and state. Running servers are never
/// touched here, however slow their boot was.
pub async fn stuck_tick(rt: &Runtime) {
    let now = now_ts();
    let grace = rt.config.stuck_grace_secs;
    let records = match rt.servers.values() {
        Ok(v) => v,
        Err(err) => {
            error!("stuck reaper: failed to read servers: {err}");
            return;
        }
    };

    for record in records {
        if !matches!(
            record.status,
            ServerStatus::Initializing | ServerStatus::Starting
        ) {
            continue;
        }
        if record.vm_handle.is_none() || record.state_since + grace > now {
            continue;
        }

        warn!(
            "stuck reaper: server {} has been {} for {}s, force-reclaiming",
            record.id,
            record.status,
            now.saturating_sub(record.state_since)
        );
        match force_teardown(rt, &record.id, TeardownTrigger::Stuck).await {
            Ok(TeardownOutcome::TornDown) => metrics().record_reaped_stuck(),
            Ok(TeardownOutcome::Skipped) => {}
            Err(err) => error!("stuck reaper: reclaim of {} failed: {err}", record.id),
        }
    }
}

/// Reconcile stored state with compute reality on startup.
///
/// - Row says VM but the provider has none -> reset the row to Stopped and
///   point DNS back at the sleeper
/// - Row is Stopped but the provider still has a VM under the server's name
///   -> zombie from a failed teardown, force-delete it
pub async fn reconcile_on_startup(rt: &Runtime) {
    let records = match rt.servers.values() {
        Ok(v) => v,
        Err(err) => {
            error!("reconcile: failed to read servers: {err}");
            return;
        }
    };

    for record in records {
        let vm_id = record.vm_handle.as_deref().and_then(|h| h.parse::<u64>().ok());
        match vm_id {
            Some(vm_id) => {
                if rt.compute.get(vm_id).await.is_err() {
                    info!(
                        "reconcile: VM {vm_id} for server {} is gone, resetting row",
                        record.id
                    );
                    if let Err(err) = repoint(
                        rt.dns.as_ref(),
                        &record.subdomain,
                        &rt.config.dns_zone_name,
                        &rt.config.sleeper_ipv4,
                    )
                    .await
                    {
                        error!("reconcile: DNS reset for {} failed: {err}", record.id);
                        continue;
                    }
                    let now = now_ts();
                    let _ = rt.servers.update(&record.id, |r| {
                        r.status = ServerStatus::Stopped;
                        r.state_since = now;
                        r.vm_handle = None;
                        r.ipv4 = None;
                        r.running_since = None;
                        r.last_billed_at = None;
                        r.runtime_accumulated_seconds = 0;
                        r.last_empty_at = None;
                    });
                    rt.record_audit(&record.id, "reconcile_reset", "startup", String::new());
                }
            }
            None if record.status == ServerStatus::Stopped => {
                let zombies = match rt.compute.list_by_name(&record.vm_name()).await {
                    Ok(v) => v,
                    Err(err) => {
                        error!("reconcile: list for {} failed: {err}", record.id);
                        continue;
                    }
                };
                for zombie in zombies {
                    warn!(
                        "reconcile: deleting zombie VM {} for stopped server {}",
                        zombie.id, record.id
                    );
                    if let Err(err) = rt.compute.delete(zombie.id).await {
                        error!("reconcile: zombie delete failed: {err}");
                    }
                }
            }
            None => {}
        }
    }
}

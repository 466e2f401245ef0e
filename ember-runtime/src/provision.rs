//! Provisioning workflow: wake, graceful teardown, forced reclamation.
//!
//! `wake` turns a sleeping server into a booting VM with correct DNS and a
//! clean storage prefix. Steps are strictly ordered; a failed step aborts the
//! remaining ones and surfaces a typed error; recovery is the next
//! reconciliation pass or user retry, never an inline retry loop.
//!
//! Known gap, kept deliberately: a failure between VM allocation and the DNS
//! swap leaves a running VM with `status = Initializing` and no DNS record.
//! There is no compensating rollback; the stuck reaper reclaims the VM after
//! its grace window.

use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use tracing::{info, warn};

use crate::artifacts::Software;
use crate::billing::settle_final;
use crate::bootstrap::{BootstrapParams, render_user_data};
use crate::compute::{ActionStatus, VmCreateRequest};
use crate::dns::repoint;
use crate::error::{EmberError, Result};
use crate::metrics::metrics;
use crate::objstore::clear_prefix;
use crate::progress::{self, WakePhase};
use crate::runtime::Runtime;
use crate::server::{ServerRecord, ServerStatus};
use crate::store::CasOutcome;
use crate::util::now_ts;

/// What caused a teardown; recorded in the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownTrigger {
    Idle,
    Credit,
    Crash,
    Stuck,
    Operator,
}

impl fmt::Display for TeardownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TeardownTrigger::Idle => "idle",
            TeardownTrigger::Credit => "credit",
            TeardownTrigger::Crash => "crash",
            TeardownTrigger::Stuck => "stuck",
            TeardownTrigger::Operator => "operator",
        })
    }
}

/// Whether a teardown actually ran or lost the CAS race to a concurrent one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownOutcome {
    TornDown,
    Skipped,
}

#[derive(Clone, Debug)]
pub struct WakeReceipt {
    pub server_id: String,
    pub session_id: String,
    pub vm_handle: String,
    pub ipv4: String,
}

fn vm_id_of(record: &ServerRecord) -> Option<u64> {
    record.vm_handle.as_deref().and_then(|h| h.parse::<u64>().ok())
}

/// Wake a sleeping server: allocate a VM, swap DNS, commit Starting.
pub async fn wake(
    rt: &Runtime,
    server_id: &str,
    software: Software,
    version: &str,
    trigger: &str,
) -> Result<WakeReceipt> {
    let record = rt
        .servers
        .get(server_id)?
        .ok_or_else(|| EmberError::NotFound(format!("no server {server_id}")))?;

    match record.status {
        ServerStatus::Stopped => {}
        ServerStatus::Initializing | ServerStatus::Starting | ServerStatus::Running => {
            return Err(EmberError::State("already starting".into()));
        }
        other => {
            return Err(EmberError::State(format!("server is {other}, retry later")));
        }
    }

    metrics().record_wake_started();
    progress::start(server_id);
    rt.record_audit(server_id, "wake", trigger, format!("{software} {version}"));

    // Zombie cleanup runs before the status flip so a burst of duplicate
    // wakes can sweep concurrently; only one of them wins the CAS below.
    progress::advance(server_id, WakePhase::ZombieSweep);
    let zombies = rt.compute.list_by_name(&record.vm_name()).await?;
    for zombie in zombies {
        warn!(
            "wake: force-deleting zombie VM {} ({}) for server {server_id}",
            zombie.id, zombie.name
        );
        rt.compute.delete(zombie.id).await?;
    }

    let session_id = Uuid::new_v4().to_string();
    let now = now_ts();
    let claimed = rt.servers.update_if(
        server_id,
        |r| r.status == ServerStatus::Stopped,
        |r| {
            r.status = ServerStatus::Initializing;
            r.state_since = now;
            r.current_session_id = session_id.clone();
        },
    )?;
    if claimed == CasOutcome::Skipped {
        return Err(EmberError::State("already starting".into()));
    }

    match run_provision(rt, &record, &session_id, software, version).await {
        Ok(receipt) => {
            info!(
                "wake: server {server_id} is booting on VM {} at {}",
                receipt.vm_handle, receipt.ipv4
            );
            rt.record_audit(server_id, "wake_provisioned", trigger, receipt.ipv4.clone());
            Ok(receipt)
        }
        Err(err) => {
            metrics().record_wake_failure();
            progress::fail(server_id, &err.to_string());
            rt.record_audit(server_id, "wake_failed", trigger, err.to_string());
            Err(err)
        }
    }
}

async fn run_provision(
    rt: &Runtime,
    record: &ServerRecord,
    session_id: &str,
    software: Software,
    version: &str,
) -> Result<WakeReceipt> {
    let server_id = record.id.as_str();

    progress::advance(server_id, WakePhase::Artifact);
    let artifact_url = rt.artifacts.resolve(software, version).await?;

    let user_data = render_user_data(&BootstrapParams {
        server_id: server_id.to_string(),
        session_id: session_id.to_string(),
        shared_secret: record.shared_secret.clone(),
        artifact_url,
        api_base: rt.config.api_public_base.clone(),
        storage_endpoint: rt.config.storage_api_base.clone(),
        storage_bucket: rt.config.storage_bucket.clone(),
        storage_prefix: record.storage_prefix(),
        storage_access_key: rt.config.storage_access_key.clone(),
        storage_secret_key: rt.config.storage_secret_key.clone(),
        fresh_install: record.fresh_install,
    });

    if record.fresh_install {
        let removed = clear_prefix(rt.storage.as_ref(), &record.storage_prefix()).await?;
        info!("wake: cleared {removed} objects under {}", record.storage_prefix());
    }

    progress::advance(server_id, WakePhase::VmAllocate);
    let created = rt
        .compute
        .create(&VmCreateRequest {
            name: record.vm_name(),
            server_type: rt.config.vm_server_type.clone(),
            image: rt.config.vm_image.clone(),
            location: rt.config.vm_location.clone(),
            user_data,
        })
        .await?;
    wait_for_action(rt, created.action_id).await?;

    let vm = rt.compute.get(created.vm_id).await?;
    let ipv4 = vm
        .ipv4
        .ok_or_else(|| EmberError::Compute(format!("VM {} has no public IPv4", created.vm_id)))?;
    let vm_handle = created.vm_id.to_string();

    // Commit the handle while still Initializing so the stuck reaper can
    // reclaim the VM if anything below fails.
    let committed = rt.servers.update_if(
        server_id,
        |r| r.status == ServerStatus::Initializing,
        |r| {
            r.vm_handle = Some(vm_handle.clone());
            r.ipv4 = Some(ipv4.clone());
        },
    )?;
    if committed == CasOutcome::Skipped {
        // A reaper or operator reset the row mid-provision; the allocated VM
        // is now a zombie for the next wake's sweep.
        return Err(EmberError::State(format!(
            "server {server_id} left Initializing mid-provision"
        )));
    }

    progress::advance(server_id, WakePhase::DnsSwap);
    repoint(
        rt.dns.as_ref(),
        &record.subdomain,
        &rt.config.dns_zone_name,
        &ipv4,
    )
    .await?;

    let now = now_ts();
    rt.servers.update_if(
        server_id,
        |r| r.status == ServerStatus::Initializing,
        |r| {
            r.status = ServerStatus::Starting;
            r.state_since = now;
            r.fresh_install = false;
        },
    )?;
    progress::advance(server_id, WakePhase::Booting);

    Ok(WakeReceipt {
        server_id: server_id.to_string(),
        session_id: session_id.to_string(),
        vm_handle,
        ipv4,
    })
}

/// Poll the provider's asynchronous action to a terminal state within the
/// configured retry budget.
async fn wait_for_action(rt: &Runtime, action_id: u64) -> Result<()> {
    for _ in 0..rt.config.vm_poll_attempts {
        match rt.compute.action_status(action_id).await? {
            ActionStatus::Success => return Ok(()),
            ActionStatus::Error => {
                return Err(EmberError::Compute(format!("action {action_id} failed")));
            }
            ActionStatus::Running => {
                tokio::time::sleep(Duration::from_secs(rt.config.vm_poll_interval_secs)).await;
            }
        }
    }
    Err(EmberError::Compute(format!(
        "action {action_id} still running after {} polls",
        rt.config.vm_poll_attempts
    )))
}

/// Best-effort wait for the provider to report the VM powered off.
async fn wait_for_power_off(rt: &Runtime, vm_id: u64) {
    for _ in 0..rt.config.shutdown_wait_secs {
        match rt.compute.get(vm_id).await {
            Ok(vm) if !vm.power_on => return,
            Ok(_) => tokio::time::sleep(Duration::from_secs(1)).await,
            Err(_) => return,
        }
    }
}

/// Graceful teardown: settle billing, signal the agent, delete the VM, swap
/// DNS back to the sleeper, reset the row. Concurrent calls collapse on the
/// Running -> Stopping CAS.
pub async fn teardown(
    rt: &Runtime,
    server_id: &str,
    trigger: TeardownTrigger,
) -> Result<TeardownOutcome> {
    let now = now_ts();
    let claimed = rt.servers.update_if(
        server_id,
        |r| r.status == ServerStatus::Running,
        |r| {
            r.status = ServerStatus::Stopping;
            r.state_since = now;
        },
    )?;
    if claimed == CasOutcome::Skipped {
        return Ok(TeardownOutcome::Skipped);
    }

    info!("teardown: stopping server {server_id} (trigger: {trigger})");
    settle_final(rt, server_id).await?;

    let record = rt
        .servers
        .get(server_id)?
        .ok_or_else(|| EmberError::NotFound(format!("no server {server_id}")))?;

    if let Some(vm_id) = vm_id_of(&record) {
        // Best-effort clean shutdown; the delete below is what must succeed.
        if let Err(err) = rt.compute.shutdown(vm_id).await {
            warn!("teardown: graceful shutdown of VM {vm_id} failed: {err}");
        } else {
            wait_for_power_off(rt, vm_id).await;
        }
        rt.compute.delete(vm_id).await?;
    }

    reset_after_teardown(rt, &record, ServerStatus::Stopping).await?;
    rt.record_audit(server_id, "teardown", &trigger.to_string(), String::new());
    Ok(TeardownOutcome::TornDown)
}

/// Forced reclamation: no graceful signal, VM deleted directly. Used by the
/// stuck reaper and the crash reset, where the VM is assumed unresponsive.
pub async fn force_teardown(
    rt: &Runtime,
    server_id: &str,
    trigger: TeardownTrigger,
) -> Result<TeardownOutcome> {
    let record = rt
        .servers
        .get(server_id)?
        .ok_or_else(|| EmberError::NotFound(format!("no server {server_id}")))?;

    if record.status != ServerStatus::Crashed {
        let now = now_ts();
        let expected = record.status;
        if !expected.can_transition_to(ServerStatus::Crashed) {
            return Ok(TeardownOutcome::Skipped);
        }
        let claimed = rt.servers.update_if(
            server_id,
            |r| r.status == expected,
            |r| {
                r.status = ServerStatus::Crashed;
                r.state_since = now;
            },
        )?;
        if claimed == CasOutcome::Skipped {
            return Ok(TeardownOutcome::Skipped);
        }
    }

    warn!("teardown: force-reclaiming server {server_id} (trigger: {trigger})");
    settle_final(rt, server_id).await?;

    if let Some(vm_id) = vm_id_of(&record) {
        rt.compute.delete(vm_id).await?;
    }

    reset_after_teardown(rt, &record, ServerStatus::Crashed).await?;
    rt.record_audit(
        server_id,
        "force_teardown",
        &trigger.to_string(),
        String::new(),
    );
    Ok(TeardownOutcome::TornDown)
}

/// Swap DNS back to the sleeper and clear the allocation fields.
async fn reset_after_teardown(
    rt: &Runtime,
    record: &ServerRecord,
    from: ServerStatus,
) -> Result<()> {
    repoint(
        rt.dns.as_ref(),
        &record.subdomain,
        &rt.config.dns_zone_name,
        &rt.config.sleeper_ipv4,
    )
    .await?;

    let now = now_ts();
    rt.servers.update_if(
        &record.id,
        |r| r.status == from,
        |r| {
            r.status = ServerStatus::Stopped;
            r.state_since = now;
            r.vm_handle = None;
            r.ipv4 = None;
            r.running_since = None;
            r.last_billed_at = None;
            r.runtime_accumulated_seconds = 0;
            r.last_empty_at = None;
            r.telemetry = None;
        },
    )?;
    Ok(())
}

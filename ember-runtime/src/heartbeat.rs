//! Heartbeat ingestion.
//!
//! The in-VM agent reports process health and player count on a short
//! interval, authenticated by the server's shared secret. The first healthy
//! report promotes Starting -> Running and anchors billing; a crash report
//! moves the row to Crashed (the caller then schedules the forced reset).
//! Every transition is a CAS, so a stale or duplicate report is a no-op.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::secrets_match;
use crate::error::{EmberError, Result};
use crate::metrics::metrics;
use crate::runtime::Runtime;
use crate::server::{ServerStatus, Telemetry};
use crate::store::CasOutcome;
use crate::util::now_ts;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Starting,
    Running,
    Stopping,
    Crashed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub server_id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub players: u32,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub disk: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Accepted,
    /// The agent reported an abnormal exit; the row is now Crashed and the
    /// caller should schedule a forced reclamation.
    CrashDetected,
}

pub fn ingest(rt: &Runtime, bearer: &str, report: &HeartbeatReport) -> Result<HeartbeatOutcome> {
    let record = rt
        .servers
        .get(&report.server_id)?
        .ok_or_else(|| EmberError::NotFound(format!("no server {}", report.server_id)))?;
    if !secrets_match(&record.shared_secret, bearer) {
        return Err(EmberError::Auth("bad shared secret".into()));
    }

    metrics().record_heartbeat();
    let now = now_ts();
    let server_id = report.server_id.as_str();

    match report.status {
        AgentStatus::Running => {
            let promoted = rt.servers.update_if(
                server_id,
                |r| r.status == ServerStatus::Starting,
                |r| {
                    r.status = ServerStatus::Running;
                    r.state_since = now;
                    r.running_since = Some(now);
                    r.last_billed_at = Some(now);
                    r.runtime_accumulated_seconds = 0;
                    r.last_empty_at = None;
                },
            )?;
            if promoted == CasOutcome::Applied {
                info!("heartbeat: server {server_id} is now running");
                rt.record_audit(server_id, "running", "heartbeat", String::new());
            }

            rt.servers.update_if(
                server_id,
                |r| r.status == ServerStatus::Running,
                |r| {
                    r.telemetry = Some(Telemetry {
                        cpu_pct: report.cpu,
                        memory_pct: report.memory,
                        disk_pct: report.disk,
                    });
                    if report.players == 0 {
                        if r.last_empty_at.is_none() {
                            r.last_empty_at = Some(now);
                        }
                    } else {
                        r.last_empty_at = None;
                    }
                },
            )?;
            Ok(HeartbeatOutcome::Accepted)
        }
        AgentStatus::Crashed => {
            let expected = record.status;
            if !expected.can_transition_to(ServerStatus::Crashed) {
                return Ok(HeartbeatOutcome::Accepted);
            }
            let moved = rt.servers.update_if(
                server_id,
                |r| r.status == expected,
                |r| {
                    r.status = ServerStatus::Crashed;
                    r.state_since = now;
                },
            )?;
            if moved == CasOutcome::Applied {
                warn!("heartbeat: server {server_id} reported a crash");
                rt.record_audit(server_id, "crashed", "heartbeat", String::new());
                Ok(HeartbeatOutcome::CrashDetected)
            } else {
                Ok(HeartbeatOutcome::Accepted)
            }
        }
        AgentStatus::Stopping => {
            rt.servers.update_if(
                server_id,
                |r| r.status == ServerStatus::Running,
                |r| {
                    r.status = ServerStatus::Stopping;
                    r.state_since = now;
                },
            )?;
            Ok(HeartbeatOutcome::Accepted)
        }
        // Still booting; the orchestrator already has the row in Starting.
        AgentStatus::Starting => Ok(HeartbeatOutcome::Accepted),
    }
}

//! Billing meter.
//!
//! Runtime is metered in fixed wall-clock intervals (default 300 s). Each
//! sweep quantizes the seconds elapsed since the server's billing anchor,
//! deducts whole intervals from the owning account and carries the
//! sub-interval remainder forward. The final settle at teardown bills the
//! exact un-quantized remainder, so lifetime billed seconds equal lifetime
//! Running seconds: no gaps, no double counts.
//!
//! Double-billing safety: the row CAS (status still Running, anchor
//! unchanged) is applied before any deduction, so an overlapping sweep that
//! lost the race skips the deduction entirely.

use tracing::{error, info, warn};

use crate::error::{EmberError, Result};
use crate::ledger::LedgerEntry;
use crate::metrics::metrics;
use crate::provision::{TeardownTrigger, teardown};
use crate::runtime::Runtime;
use crate::server::{ServerRecord, ServerStatus};
use crate::store::CasOutcome;
use crate::util::now_ts;

/// Split elapsed seconds into whole billable intervals and the carried
/// remainder. Partial intervals are never billed by the periodic sweep.
pub fn quantize(elapsed: u64, interval: u64) -> (u64, u64) {
    if interval == 0 {
        return (0, elapsed);
    }
    let billed = (elapsed / interval) * interval;
    (billed, elapsed - billed)
}

fn interval_cost(seconds: u64, cost_per_hour: f64) -> f64 {
    (seconds as f64 / 3600.0) * cost_per_hour
}

/// One sweep over every Running server.
pub async fn billing_tick(rt: &Runtime) {
    let records = match rt.servers.values() {
        Ok(v) => v,
        Err(err) => {
            error!("billing: failed to read servers: {err}");
            return;
        }
    };

    for record in records {
        if record.status != ServerStatus::Running || record.last_billed_at.is_none() {
            continue;
        }
        if let Err(err) = settle_intervals(rt, &record).await {
            error!("billing: settle failed for server {}: {err}", record.id);
        }
    }
}

/// Bill the whole intervals that have elapsed for one server.
pub async fn settle_intervals(rt: &Runtime, record: &ServerRecord) -> Result<()> {
    let now = now_ts();
    let anchor = match record.last_billed_at {
        Some(at) => at,
        None => return Ok(()),
    };
    let elapsed = now.saturating_sub(anchor) + record.runtime_accumulated_seconds;
    let interval = rt.config.billing_interval_secs;
    let (billed, remainder) = quantize(elapsed, interval);
    if billed == 0 {
        return Ok(());
    }

    let cost = interval_cost(billed, record.cost_per_hour);
    let account = rt
        .accounts
        .get(&record.account_id)?
        .ok_or_else(|| EmberError::NotFound(format!("no account {}", record.account_id)))?;

    if account.credits_balance < cost {
        warn!(
            "billing: account {} has {:.4} credits, needs {cost:.4}, stopping server {}",
            record.account_id, account.credits_balance, record.id
        );
        metrics().record_billing_shutdown();
        rt.record_audit(
            &record.id,
            "billing_shutdown",
            "credit",
            format!("balance {:.4}, cost {cost:.4}", account.credits_balance),
        );
        teardown(rt, &record.id, TeardownTrigger::Credit).await?;
        return Ok(());
    }

    // Advance the anchor first; a concurrent sweep with the same stale anchor
    // is skipped here and deducts nothing.
    let advanced = rt.servers.update_if(
        &record.id,
        |r| r.status == ServerStatus::Running && r.last_billed_at == Some(anchor),
        |r| {
            r.last_billed_at = Some(now);
            r.runtime_accumulated_seconds = remainder;
        },
    )?;
    if advanced == CasOutcome::Skipped {
        return Ok(());
    }

    deduct(rt, record, billed, cost)?;
    metrics().record_billed_intervals(billed / interval.max(1));
    info!(
        "billing: server {} billed {billed}s ({cost:.4} credits), carrying {remainder}s",
        record.id
    );
    Ok(())
}

/// Bill the exact remaining seconds at teardown and zero the checkpoint.
/// The balance may go slightly negative here; the server is stopping anyway.
pub async fn settle_final(rt: &Runtime, server_id: &str) -> Result<()> {
    let record = rt
        .servers
        .get(server_id)?
        .ok_or_else(|| EmberError::NotFound(format!("no server {server_id}")))?;
    let anchor = match record.last_billed_at {
        Some(at) => at,
        None => return Ok(()),
    };

    let now = now_ts();
    let elapsed = now.saturating_sub(anchor) + record.runtime_accumulated_seconds;

    let advanced = rt.servers.update_if(
        server_id,
        |r| r.last_billed_at == Some(anchor),
        |r| {
            r.last_billed_at = Some(now);
            r.runtime_accumulated_seconds = 0;
        },
    )?;
    if advanced == CasOutcome::Skipped || elapsed == 0 {
        return Ok(());
    }

    let cost = interval_cost(elapsed, record.cost_per_hour);
    deduct(rt, &record, elapsed, cost)?;
    info!("billing: server {server_id} final settle of {elapsed}s ({cost:.4} credits)");
    Ok(())
}

fn deduct(rt: &Runtime, record: &ServerRecord, seconds: u64, cost: f64) -> Result<()> {
    rt.accounts.update(&record.account_id, |account| {
        account.credits_balance -= cost;
    })?;
    let balance_after = rt
        .accounts
        .get(&record.account_id)?
        .map(|a| a.credits_balance)
        .unwrap_or_default();
    rt.ledger.append(&LedgerEntry {
        account_id: record.account_id.clone(),
        server_id: record.id.clone(),
        session_id: record.current_session_id.clone(),
        seconds,
        cost,
        balance_after,
        at: now_ts(),
    })
}

//! Reaper tests: idle auto-stop, stuck-state reclamation, startup
//! reconciliation, overlap idempotency.

mod common;

use common::*;

use ember_runtime::ledger::AuditEntry;
use ember_runtime::provision::{self, TeardownOutcome, TeardownTrigger};
use ember_runtime::reaper::{idle_tick, reconcile_on_startup, stuck_tick};
use ember_runtime::server::ServerStatus;
use ember_runtime::util::now_ts;

#[tokio::test]
async fn idle_server_is_torn_down_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);

    let mut record = server("srv-empty", "ghosttown");
    record.status = ServerStatus::Running;
    record.vm_handle = Some("61".to_string());
    record.auto_stop_timeout_minutes = 10;
    record.last_empty_at = Some(now_ts() - 700); // 700s > 600s timeout
    record.last_billed_at = Some(now_ts() - 700);
    seed_server(&h, record);
    seed_account(&h, "acct-1", 50.0);
    h.compute.seed_vm(61, "ember-srv-empty", "203.0.113.61");

    idle_tick(&h.rt).await;

    let row = h.rt.servers.get("srv-empty").unwrap().unwrap();
    assert_eq!(row.status, ServerStatus::Stopped);
    assert_eq!(h.compute.deleted(), vec![61]);

    // The final partial interval made it to the ledger before the VM died.
    let ledger: Vec<ember_runtime::ledger::LedgerEntry> = h.rt.ledger.entries().unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(ledger[0].seconds >= 700);

    // An overlapping sweep arrives late: the conditional update makes it a
    // no-op, not a second teardown.
    idle_tick(&h.rt).await;
    let second = provision::teardown(&h.rt, "srv-empty", TeardownTrigger::Idle)
        .await
        .unwrap();
    assert_eq!(second, TeardownOutcome::Skipped);
    assert_eq!(h.compute.deleted(), vec![61]);
    assert_eq!(h.rt.ledger.entries::<ember_runtime::ledger::LedgerEntry>().unwrap().len(), 1);
}

#[tokio::test]
async fn occupied_or_fresh_servers_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);

    // Players online: last_empty_at is unset.
    let mut occupied = server("srv-busy", "busy");
    occupied.status = ServerStatus::Running;
    occupied.last_billed_at = Some(now_ts());
    seed_server(&h, occupied);

    // Empty, but not yet past the timeout.
    let mut fresh = server("srv-fresh", "fresh");
    fresh.status = ServerStatus::Running;
    fresh.last_empty_at = Some(now_ts() - 60);
    fresh.last_billed_at = Some(now_ts());
    seed_server(&h, fresh);
    seed_account(&h, "acct-1", 50.0);

    idle_tick(&h.rt).await;

    assert_eq!(
        h.rt.servers.get("srv-busy").unwrap().unwrap().status,
        ServerStatus::Running
    );
    assert_eq!(
        h.rt.servers.get("srv-fresh").unwrap().unwrap().status,
        ServerStatus::Running
    );
    assert!(h.compute.deleted().is_empty());
}

// A server wedged mid-provision past the grace window is force-reclaimed:
// no graceful shutdown, VM deleted directly, DNS back on the sleeper. A
// Running server with an old state timestamp is never touched.
#[tokio::test]
async fn stuck_initializing_is_reclaimed_but_running_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);

    let mut stuck = server("srv-stuck", "frozen");
    stuck.status = ServerStatus::Initializing;
    stuck.vm_handle = Some("71".to_string());
    stuck.state_since = now_ts() - 3600; // grace window is 1800s
    seed_server(&h, stuck);
    h.compute.seed_vm(71, "ember-srv-stuck", "203.0.113.71");

    let mut slow_but_fine = server("srv-slow", "slowpoke");
    slow_but_fine.status = ServerStatus::Running;
    slow_but_fine.vm_handle = Some("72".to_string());
    slow_but_fine.state_since = now_ts() - 7200;
    slow_but_fine.last_billed_at = Some(now_ts());
    seed_server(&h, slow_but_fine);
    seed_account(&h, "acct-1", 50.0);
    h.compute.seed_vm(72, "ember-srv-slow", "203.0.113.72");

    stuck_tick(&h.rt).await;

    let reclaimed = h.rt.servers.get("srv-stuck").unwrap().unwrap();
    assert_eq!(reclaimed.status, ServerStatus::Stopped);
    assert!(reclaimed.vm_handle.is_none());
    assert_eq!(h.compute.deleted(), vec![71]);
    // Forced path skips the graceful shutdown signal.
    assert!(h.compute.shutdowns().is_empty());
    assert_eq!(
        h.dns.a_record_content("frozen.play.example.net").as_deref(),
        Some("198.51.100.7")
    );

    let untouched = h.rt.servers.get("srv-slow").unwrap().unwrap();
    assert_eq!(untouched.status, ServerStatus::Running);
    assert_eq!(untouched.vm_handle.as_deref(), Some("72"));

    let audit: Vec<AuditEntry> = h.rt.audit.entries().unwrap();
    assert!(
        audit
            .iter()
            .any(|e| e.action == "force_teardown" && e.trigger == "stuck")
    );
}

#[tokio::test]
async fn stuck_rows_inside_the_grace_window_wait() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);

    let mut booting = server("srv-boot", "booting");
    booting.status = ServerStatus::Starting;
    booting.vm_handle = Some("81".to_string());
    booting.state_since = now_ts() - 60;
    seed_server(&h, booting);
    h.compute.seed_vm(81, "ember-srv-boot", "203.0.113.81");

    stuck_tick(&h.rt).await;

    assert_eq!(
        h.rt.servers.get("srv-boot").unwrap().unwrap().status,
        ServerStatus::Starting
    );
    assert!(h.compute.deleted().is_empty());
}

#[tokio::test]
async fn startup_reconciliation_repairs_both_directions() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);

    // Row says Running on VM 91, but the provider lost it.
    let mut orphaned = server("srv-orphan", "orphan");
    orphaned.status = ServerStatus::Running;
    orphaned.vm_handle = Some("91".to_string());
    orphaned.last_billed_at = Some(now_ts());
    seed_server(&h, orphaned);

    // Row says Stopped, but a zombie VM still burns money under its name.
    seed_server(&h, server("srv-zombie", "zombie"));
    h.compute.seed_vm(92, "ember-srv-zombie", "203.0.113.92");

    reconcile_on_startup(&h.rt).await;

    let repaired = h.rt.servers.get("srv-orphan").unwrap().unwrap();
    assert_eq!(repaired.status, ServerStatus::Stopped);
    assert!(repaired.vm_handle.is_none());
    assert!(repaired.last_billed_at.is_none());
    assert_eq!(
        h.dns.a_record_content("orphan.play.example.net").as_deref(),
        Some("198.51.100.7")
    );

    assert_eq!(h.compute.deleted(), vec![92]);
}

//! Provisioner tests: the wake workflow end to end over mock providers,
//! with the artifact metadata API mocked by wiremock.

mod common;

use common::*;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ember_runtime::artifacts::Software;
use ember_runtime::ledger::AuditEntry;
use ember_runtime::provision::{self, TeardownOutcome, TeardownTrigger};
use ember_runtime::server::ServerStatus;

async fn paper_metadata_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/projects/paper/versions/1.21.4/builds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "builds": [
                { "build": 90, "downloads": { "application": { "name": "paper-1.21.4-90.jar" } } },
                { "build": 101, "downloads": { "application": { "name": "paper-1.21.4-101.jar" } } }
            ]
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn wake_provisions_vm_dns_and_state() {
    let upstream = paper_metadata_server().await;
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), Some(upstream.uri()));

    let mut record = server("srv-wake", "skyblock");
    record.fresh_install = true;
    seed_server(&h, record);
    seed_account(&h, "acct-1", 50.0);

    // A zombie VM from a previous failed teardown, plus stale world files.
    h.compute.seed_vm(7, "ember-srv-wake", "203.0.113.9");
    h.storage
        .seed_keys(&["servers/srv-wake/world/level.dat", "servers/other/keep.dat"]);

    let receipt = provision::wake(&h.rt, "srv-wake", Software::Paper, "1.21.4", "login")
        .await
        .unwrap();

    // Zombie swept before allocation.
    assert!(h.compute.deleted().contains(&7));

    // Fresh install cleared only this server's prefix.
    let keys = h.storage.keys.lock().unwrap().clone();
    assert_eq!(keys, vec!["servers/other/keep.dat".to_string()]);

    // Row committed to Starting with the allocation attached.
    let row = h.rt.servers.get("srv-wake").unwrap().unwrap();
    assert_eq!(row.status, ServerStatus::Starting);
    assert_eq!(row.vm_handle.as_deref(), Some(receipt.vm_handle.as_str()));
    assert_eq!(row.ipv4.as_deref(), Some(receipt.ipv4.as_str()));
    assert_eq!(row.current_session_id, receipt.session_id);
    assert_ne!(row.current_session_id, "session-0");
    assert!(!row.fresh_install);

    // DNS points at the new VM, SRV alongside for client discovery.
    assert_eq!(
        h.dns.a_record_content("skyblock.play.example.net").as_deref(),
        Some(receipt.ipv4.as_str())
    );
    let srv = h
        .dns
        .srv_record_content("_minecraft._tcp.skyblock.play.example.net")
        .unwrap();
    assert!(srv.contains("skyblock.play.example.net"));

    let audit: Vec<AuditEntry> = h.rt.audit.entries().unwrap();
    assert!(audit.iter().any(|e| e.action == "wake_provisioned"));
}

#[tokio::test]
async fn wake_rejects_servers_that_are_not_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);

    for status in [
        ServerStatus::Initializing,
        ServerStatus::Starting,
        ServerStatus::Running,
    ] {
        let id = format!("srv-{status}");
        let mut record = server(&id, &format!("sub-{status}"));
        record.status = status;
        seed_server(&h, record);

        let err = provision::wake(&h.rt, &id, Software::Paper, "1.21.4", "login")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already starting"), "{status}: {err}");
    }

    // No provider traffic for rejected wakes.
    assert!(h.compute.deleted().is_empty());
    assert!(h.dns.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn wake_failure_leaves_the_last_committed_phase() {
    // No artifact route mounted: resolution 404s after the row was claimed.
    let upstream = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), Some(upstream.uri()));

    seed_server(&h, server("srv-fail", "doomed"));
    seed_account(&h, "acct-1", 50.0);

    let err = provision::wake(&h.rt, "srv-fail", Software::Paper, "1.21.4", "api")
        .await
        .unwrap_err();
    assert!(matches!(err, ember_runtime::EmberError::Artifact(_)));

    // Aborted where it failed: no VM, no DNS, row still Initializing.
    let row = h.rt.servers.get("srv-fail").unwrap().unwrap();
    assert_eq!(row.status, ServerStatus::Initializing);
    assert!(row.vm_handle.is_none());
    assert!(h.dns.records.lock().unwrap().is_empty());

    let audit: Vec<AuditEntry> = h.rt.audit.entries().unwrap();
    assert!(audit.iter().any(|e| e.action == "wake_failed"));
}

#[tokio::test]
async fn graceful_teardown_mirrors_the_wake() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);

    let mut record = server("srv-down", "lobby");
    record.status = ServerStatus::Running;
    record.vm_handle = Some("42".to_string());
    record.ipv4 = Some("203.0.113.42".to_string());
    record.running_since = Some(ember_runtime::util::now_ts() - 400);
    record.last_billed_at = Some(ember_runtime::util::now_ts() - 100);
    seed_server(&h, record);
    seed_account(&h, "acct-1", 50.0);
    h.compute.seed_vm(42, "ember-srv-down", "203.0.113.42");

    let outcome = provision::teardown(&h.rt, "srv-down", TeardownTrigger::Operator)
        .await
        .unwrap();
    assert_eq!(outcome, TeardownOutcome::TornDown);

    // Graceful signal first, then delete.
    assert_eq!(h.compute.shutdowns(), vec![42]);
    assert_eq!(h.compute.deleted(), vec![42]);

    // DNS back on the sleeper, row fully reset.
    assert_eq!(
        h.dns.a_record_content("lobby.play.example.net").as_deref(),
        Some("198.51.100.7")
    );
    let row = h.rt.servers.get("srv-down").unwrap().unwrap();
    assert_eq!(row.status, ServerStatus::Stopped);
    assert!(row.vm_handle.is_none());
    assert!(row.ipv4.is_none());
    assert!(row.running_since.is_none());
    assert!(row.last_billed_at.is_none());
    assert_eq!(row.runtime_accumulated_seconds, 0);
    assert!(row.last_empty_at.is_none());

    // The 100 settled seconds hit the ledger.
    let ledger: Vec<ember_runtime::ledger::LedgerEntry> = h.rt.ledger.entries().unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(ledger[0].seconds >= 100);
}

#[tokio::test]
async fn teardown_of_a_stopped_server_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), None);
    seed_server(&h, server("srv-idle", "calm"));

    let outcome = provision::teardown(&h.rt, "srv-idle", TeardownTrigger::Idle)
        .await
        .unwrap();
    assert_eq!(outcome, TeardownOutcome::Skipped);

    let forced = provision::force_teardown(&h.rt, "srv-idle", TeardownTrigger::Stuck)
        .await
        .unwrap();
    assert_eq!(forced, TeardownOutcome::Skipped);

    // Exactly zero side effects either way.
    assert!(h.compute.deleted().is_empty());
    assert!(h.dns.records.lock().unwrap().is_empty());
    assert!(h.rt.ledger.entries::<ember_runtime::ledger::LedgerEntry>().unwrap().is_empty());
}

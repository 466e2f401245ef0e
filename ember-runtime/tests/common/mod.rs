//! Shared test fixtures: in-memory providers and a runtime builder.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ember_runtime::compute::{ActionStatus, ComputeProvider, VmCreateRequest, VmCreated, VmInfo};
use ember_runtime::dns::{DnsProvider, DnsRecord, DnsRecordSpec};
use ember_runtime::error::{EmberError, Result};
use ember_runtime::objstore::ObjectStore;
use ember_runtime::server::{AccountRecord, ServerRecord, ServerStatus};
use ember_runtime::util::now_ts;
use ember_runtime::{Runtime, RuntimeConfig};

// ---------------------------------------------------------------------------
// Compute
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ComputeState {
    pub vms: HashMap<u64, VmInfo>,
    pub next_id: u64,
    pub deleted: Vec<u64>,
    pub shutdowns: Vec<u64>,
    pub fail_create: bool,
}

#[derive(Default)]
pub struct MockCompute {
    pub state: Mutex<ComputeState>,
}

impl MockCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ComputeState {
                next_id: 100,
                ..Default::default()
            }),
        })
    }

    pub fn seed_vm(&self, id: u64, name: &str, ipv4: &str) {
        self.state.lock().unwrap().vms.insert(
            id,
            VmInfo {
                id,
                name: name.to_string(),
                ipv4: Some(ipv4.to_string()),
                power_on: true,
            },
        );
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn shutdowns(&self) -> Vec<u64> {
        self.state.lock().unwrap().shutdowns.clone()
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    async fn list_by_name(&self, name: &str) -> Result<Vec<VmInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .vms
            .values()
            .filter(|vm| vm.name == name)
            .cloned()
            .collect())
    }

    async fn create(&self, request: &VmCreateRequest) -> Result<VmCreated> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(EmberError::Compute("create rejected".into()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.vms.insert(
            id,
            VmInfo {
                id,
                name: request.name.clone(),
                ipv4: Some(format!("203.0.113.{}", id % 250)),
                power_on: true,
            },
        );
        Ok(VmCreated {
            vm_id: id,
            action_id: id + 10_000,
        })
    }

    async fn action_status(&self, _action_id: u64) -> Result<ActionStatus> {
        Ok(ActionStatus::Success)
    }

    async fn get(&self, vm_id: u64) -> Result<VmInfo> {
        self.state
            .lock()
            .unwrap()
            .vms
            .get(&vm_id)
            .cloned()
            .ok_or_else(|| EmberError::Compute(format!("no VM {vm_id}")))
    }

    async fn shutdown(&self, vm_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.shutdowns.push(vm_id);
        if let Some(vm) = state.vms.get_mut(&vm_id) {
            vm.power_on = false;
        }
        Ok(())
    }

    async fn delete(&self, vm_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.vms.remove(&vm_id);
        state.deleted.push(vm_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DNS
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockDns {
    pub records: Mutex<Vec<DnsRecord>>,
    next_id: Mutex<u64>,
}

impl MockDns {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn a_record_content(&self, name: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.kind == "A" && r.name == name)
            .map(|r| r.content.clone())
    }

    pub fn srv_record_content(&self, name: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.kind == "SRV" && r.name == name)
            .map(|r| r.content.clone())
    }
}

#[async_trait]
impl DnsProvider for MockDns {
    async fn list_records(&self, name: &str) -> Result<Vec<DnsRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect())
    }

    async fn create_record(&self, spec: &DnsRecordSpec) -> Result<()> {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        self.records.lock().unwrap().push(DnsRecord {
            id: next.to_string(),
            kind: spec.kind.clone(),
            name: spec.name.clone(),
            content: spec.content.clone(),
        });
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        self.records.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockStorage {
    pub keys: Mutex<Vec<String>>,
}

impl MockStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_keys(&self, keys: &[&str]) {
        self.keys
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_string()));
    }
}

#[async_trait]
impl ObjectStore for MockStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.keys.lock().unwrap().retain(|k| k != key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime builder
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub rt: Arc<Runtime>,
    pub compute: Arc<MockCompute>,
    pub dns: Arc<MockDns>,
    pub storage: Arc<MockStorage>,
}

pub fn test_config(state_dir: &Path, artifact_base: Option<String>) -> RuntimeConfig {
    RuntimeConfig {
        state_dir: state_dir.to_path_buf(),
        api_bind: "127.0.0.1:0".into(),
        api_public_base: "http://127.0.0.1:8360".into(),
        sleeper_bind: "127.0.0.1:0".into(),
        sleeper_ipv4: "198.51.100.7".into(),
        sleeper_read_timeout_secs: 10,
        operator_secret: "operator-secret".into(),
        http_timeout: Duration::from_secs(5),
        compute_api_base: "http://unused".into(),
        compute_api_token: String::new(),
        vm_server_type: "cpx31".into(),
        vm_image: "ubuntu-24.04".into(),
        vm_location: "fsn1".into(),
        vm_poll_interval_secs: 0,
        vm_poll_attempts: 3,
        shutdown_wait_secs: 0,
        dns_api_base: "http://unused".into(),
        dns_api_token: String::new(),
        dns_zone_id: "zone".into(),
        dns_zone_name: "play.example.net".into(),
        storage_api_base: "http://unused".into(),
        storage_bucket: "ember-servers".into(),
        storage_access_key: String::new(),
        storage_secret_key: String::new(),
        artifact_api_base: artifact_base,
        billing_interval_secs: 300,
        stuck_grace_secs: 1800,
        billing_sweep_secs: 60,
        idle_sweep_secs: 60,
        stuck_sweep_secs: 300,
        billing_cron: None,
        idle_cron: None,
        stuck_cron: None,
    }
}

pub fn harness(state_dir: &Path, artifact_base: Option<String>) -> TestHarness {
    let compute = MockCompute::new();
    let dns = MockDns::new();
    let storage = MockStorage::new();
    let rt = Runtime::open(
        test_config(state_dir, artifact_base),
        compute.clone(),
        dns.clone(),
        storage.clone(),
    )
    .unwrap();
    TestHarness {
        rt: Arc::new(rt),
        compute,
        dns,
        storage,
    }
}

/// A Stopped server with sane defaults; tests mutate what they need.
pub fn server(id: &str, subdomain: &str) -> ServerRecord {
    ServerRecord {
        id: id.to_string(),
        account_id: "acct-1".to_string(),
        subdomain: subdomain.to_string(),
        status: ServerStatus::Stopped,
        state_since: now_ts(),
        vm_handle: None,
        ipv4: None,
        shared_secret: "per-server-secret".to_string(),
        software: "paper".to_string(),
        version: "1.21.4".to_string(),
        motd: "Skyblock Season 4".to_string(),
        running_since: None,
        last_billed_at: None,
        runtime_accumulated_seconds: 0,
        cost_per_hour: 3.6,
        auto_stop_timeout_minutes: 10,
        last_empty_at: None,
        current_session_id: "session-0".to_string(),
        whitelist_enabled: false,
        whitelist: Vec::new(),
        fresh_install: false,
        telemetry: None,
        created_at: now_ts(),
    }
}

pub fn seed_server(h: &TestHarness, record: ServerRecord) {
    h.rt.servers.insert(record.id.clone(), record).unwrap();
}

pub fn seed_account(h: &TestHarness, id: &str, balance: f64) {
    h.rt.accounts
        .insert(
            id.to_string(),
            AccountRecord {
                id: id.to_string(),
                credits_balance: balance,
            },
        )
        .unwrap();
}

//! The orchestrator's shared context.
//!
//! One `Runtime` per process, created at startup and passed by `Arc` to the
//! API, the sleeper directory and the reconciliation jobs: an explicit,
//! lifecycle-scoped object rather than a process-wide singleton.

use std::sync::Arc;

use tracing::error;

use crate::artifacts::ArtifactResolver;
use crate::compute::{ComputeProvider, HttpComputeProvider};
use crate::config::RuntimeConfig;
use crate::dns::{DnsProvider, HttpDnsProvider};
use crate::error::Result;
use crate::ledger::AuditEntry;
use crate::objstore::{HttpObjectStore, ObjectStore};
use crate::server::{AccountRecord, ServerRecord};
use crate::store::{AppendLog, PersistentStore, ensure_state_dir};
use crate::util::now_ts;

pub struct Runtime {
    pub config: RuntimeConfig,
    pub servers: PersistentStore<ServerRecord>,
    pub accounts: PersistentStore<AccountRecord>,
    pub ledger: AppendLog,
    pub audit: AppendLog,
    pub compute: Arc<dyn ComputeProvider>,
    pub dns: Arc<dyn DnsProvider>,
    pub storage: Arc<dyn ObjectStore>,
    pub artifacts: ArtifactResolver,
}

impl Runtime {
    /// Open the stores and wire the given providers.
    pub fn open(
        config: RuntimeConfig,
        compute: Arc<dyn ComputeProvider>,
        dns: Arc<dyn DnsProvider>,
        storage: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        ensure_state_dir(&config.state_dir)?;
        let servers = PersistentStore::open(config.state_dir.join("servers.json"))?;
        let accounts = PersistentStore::open(config.state_dir.join("accounts.json"))?;
        let ledger = AppendLog::open(config.state_dir.join("ledger.jsonl"))?;
        let audit = AppendLog::open(config.state_dir.join("audit.jsonl"))?;
        let artifacts = ArtifactResolver::new(config.artifact_api_base.clone(), config.http_timeout);
        Ok(Self {
            config,
            servers,
            accounts,
            ledger,
            audit,
            compute,
            dns,
            storage,
            artifacts,
        })
    }

    /// Production wiring: HTTP clients for every provider, built from config.
    pub fn open_with_http_providers(config: RuntimeConfig) -> Result<Self> {
        let compute: Arc<dyn ComputeProvider> = Arc::new(HttpComputeProvider::new(
            config.compute_api_base.clone(),
            config.compute_api_token.clone(),
            config.http_timeout,
        ));
        let dns: Arc<dyn DnsProvider> = Arc::new(HttpDnsProvider::new(
            config.dns_api_base.clone(),
            config.dns_api_token.clone(),
            config.dns_zone_id.clone(),
            config.http_timeout,
        ));
        let storage: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
            config.storage_api_base.clone(),
            config.storage_bucket.clone(),
            config.storage_access_key.clone(),
            config.http_timeout,
        ));
        Self::open(config, compute, dns, storage)
    }

    /// Append to the audit trail; a failed append is logged, never fatal.
    pub fn record_audit(&self, server_id: &str, action: &str, trigger: &str, detail: String) {
        let entry = AuditEntry {
            server_id: server_id.to_string(),
            action: action.to_string(),
            trigger: trigger.to_string(),
            detail,
            at: now_ts(),
        };
        if let Err(err) = self.audit.append(&entry) {
            error!("audit: failed to append {action} for {server_id}: {err}");
        }
    }
}

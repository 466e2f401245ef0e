//! `ServerDirectory` implementation over the lifecycle store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use ember_runtime::artifacts::Software;
use ember_runtime::provision;
use ember_runtime::{Runtime, ServerStatus};
use ember_sleeper::{ServerDirectory, SleeperView, ViewState, WakeRefusal};

pub struct RuntimeDirectory {
    rt: Arc<Runtime>,
}

impl RuntimeDirectory {
    pub fn new(rt: Arc<Runtime>) -> Self {
        Self { rt }
    }
}

#[async_trait]
impl ServerDirectory for RuntimeDirectory {
    async fn lookup(&self, subdomain: &str) -> Option<SleeperView> {
        let record = self
            .rt
            .servers
            .find(|r| r.subdomain == subdomain)
            .ok()
            .flatten()?;
        Some(SleeperView {
            server_id: record.id.clone(),
            state: if record.status == ServerStatus::Stopped {
                ViewState::Sleeping
            } else {
                ViewState::Waking
            },
            motd: Some(record.motd.clone()).filter(|m| !m.is_empty()),
            software: record.software.clone(),
            version: record.version.clone(),
            whitelist_enabled: record.whitelist_enabled,
            whitelist: record.whitelist.clone(),
        })
    }

    async fn wake(
        &self,
        server_id: &str,
        software: &str,
        version: &str,
    ) -> Result<(), WakeRefusal> {
        let software: Software = software
            .parse()
            .map_err(|err: ember_runtime::EmberError| WakeRefusal::Failed(err.to_string()))?;

        // Cheap synchronous re-check so a racing login gets the right kick.
        match self.rt.servers.get(server_id) {
            Ok(Some(record)) if record.status == ServerStatus::Stopped => {}
            Ok(Some(_)) => return Err(WakeRefusal::AlreadyStarting),
            Ok(None) => return Err(WakeRefusal::Failed(format!("no server {server_id}"))),
            Err(err) => return Err(WakeRefusal::Failed(err.to_string())),
        }

        // The kick must go out now; provisioning takes tens of seconds. The
        // provisioner's Stopped -> Initializing CAS dedups concurrent logins,
        // and a deep failure lands in the audit trail for the stuck reaper.
        let rt = self.rt.clone();
        let server_id = server_id.to_string();
        let version = version.to_string();
        tokio::spawn(async move {
            if let Err(err) = provision::wake(&rt, &server_id, software, &version, "login").await {
                error!("wake: server {server_id} failed: {err}");
            }
        });
        Ok(())
    }
}

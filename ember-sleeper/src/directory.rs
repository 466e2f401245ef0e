//! The seam between the wire layer and the orchestrator.
//!
//! The listener only ever needs two things: a read-only view of the server
//! behind a subdomain, and a way to trigger a wake. The binary implements
//! this over the lifecycle store and the provisioner; tests implement it
//! with counters.

use async_trait::async_trait;

/// Where the server is in its lifecycle, as far as the sleeper cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewState {
    /// Stopped; a login may trigger a wake.
    Sleeping,
    /// Provisioning, booting, running or stopping; logins are bounced.
    Waking,
}

#[derive(Clone, Debug)]
pub struct SleeperView {
    pub server_id: String,
    pub state: ViewState,
    pub motd: Option<String>,
    pub software: String,
    pub version: String,
    pub whitelist_enabled: bool,
    pub whitelist: Vec<String>,
}

impl SleeperView {
    pub fn allows(&self, username: &str) -> bool {
        !self.whitelist_enabled
            || self
                .whitelist
                .iter()
                .any(|entry| entry.eq_ignore_ascii_case(username))
    }
}

/// Why a wake did not happen.
#[derive(Clone, Debug)]
pub enum WakeRefusal {
    /// Someone else already started this server.
    AlreadyStarting,
    /// The provisioner rejected or failed the request.
    Failed(String),
}

#[async_trait]
pub trait ServerDirectory: Send + Sync {
    async fn lookup(&self, subdomain: &str) -> Option<SleeperView>;
    async fn wake(
        &self,
        server_id: &str,
        software: &str,
        version: &str,
    ) -> Result<(), WakeRefusal>;
}

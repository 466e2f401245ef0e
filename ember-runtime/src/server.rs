use serde::{Deserialize, Serialize};

/// Lifecycle states of a logical game server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    #[default]
    Stopped,
    Initializing,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl ServerStatus {
    /// The explicit transition table. Everything not listed here is illegal;
    /// writers must go through `PersistentStore::update_if` so a stale writer
    /// degrades to a no-op instead of clobbering a concurrent transition.
    pub fn can_transition_to(self, to: ServerStatus) -> bool {
        use ServerStatus::*;
        matches!(
            (self, to),
            (Stopped, Initializing)
                | (Initializing, Starting)
                | (Starting, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Initializing, Crashed)
                | (Starting, Crashed)
                | (Running, Crashed)
                | (Crashed, Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Initializing => "initializing",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest resource report from the in-VM agent.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub disk_pct: f64,
}

/// The central entity: one row per logical server, mutated by the
/// provisioner, the heartbeat ingester and the reconciliation jobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub account_id: String,
    /// Unique DNS label; also the sleeper proxy's routing key.
    pub subdomain: String,
    pub status: ServerStatus,
    /// When the current status was entered. Consulted by the stuck reaper.
    #[serde(default)]
    pub state_since: u64,
    /// Non-null iff a cloud VM is currently allocated.
    pub vm_handle: Option<String>,
    pub ipv4: Option<String>,
    /// Bearer credential for the VM-side agent; scoped per server, never rotated.
    pub shared_secret: String,
    pub software: String,
    pub version: String,
    pub motd: String,
    pub running_since: Option<u64>,
    /// Billing checkpoint pair: wall-clock anchor plus the carried
    /// sub-interval remainder. Lifetime billed seconds must equal lifetime
    /// Running seconds, with no gaps and no double counts.
    pub last_billed_at: Option<u64>,
    #[serde(default)]
    pub runtime_accumulated_seconds: u64,
    pub cost_per_hour: f64,
    /// Minutes of zero-player idleness before teardown.
    pub auto_stop_timeout_minutes: u64,
    pub last_empty_at: Option<u64>,
    /// Regenerated on every Stopped -> Initializing transition; ledger entries
    /// are attributed to it so one run maps to one session.
    pub current_session_id: String,
    #[serde(default)]
    pub whitelist_enabled: bool,
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Set when the next wake must start from a clean storage prefix.
    #[serde(default)]
    pub fresh_install: bool,
    #[serde(default)]
    pub telemetry: Option<Telemetry>,
    pub created_at: u64,
}

impl ServerRecord {
    /// Name the cloud VM carries; the zombie sweep looks VMs up by it.
    pub fn vm_name(&self) -> String {
        format!("ember-{}", self.id)
    }

    /// Per-server object storage prefix the in-VM agent syncs under.
    pub fn storage_prefix(&self) -> String {
        format!("servers/{}/", self.id)
    }

    pub fn is_whitelisted(&self, username: &str) -> bool {
        self.whitelist
            .iter()
            .any(|entry| entry.eq_ignore_ascii_case(username))
    }
}

/// The owning account; credits live here, not on the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub credits_balance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_lifecycle() {
        use ServerStatus::*;
        assert!(Stopped.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Crashed.can_transition_to(Stopped));
        for from in [Initializing, Starting, Running] {
            assert!(from.can_transition_to(Crashed));
        }

        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Crashed));
        assert!(!Stopping.can_transition_to(Running));
    }

    #[test]
    fn whitelist_check_is_case_insensitive() {
        let mut record = test_record();
        record.whitelist = vec!["Steve".into(), "alex".into()];
        assert!(record.is_whitelisted("steve"));
        assert!(record.is_whitelisted("ALEX"));
        assert!(!record.is_whitelisted("herobrine"));
    }

    fn test_record() -> ServerRecord {
        ServerRecord {
            id: "srv-1".into(),
            account_id: "acct-1".into(),
            subdomain: "skyblock".into(),
            status: ServerStatus::Stopped,
            state_since: 0,
            vm_handle: None,
            ipv4: None,
            shared_secret: "s".into(),
            software: "paper".into(),
            version: "1.21.4".into(),
            motd: "A server".into(),
            running_since: None,
            last_billed_at: None,
            runtime_accumulated_seconds: 0,
            cost_per_hour: 0.6,
            auto_stop_timeout_minutes: 10,
            last_empty_at: None,
            current_session_id: String::new(),
            whitelist_enabled: false,
            whitelist: Vec::new(),
            fresh_install: false,
            telemetry: None,
            created_at: 0,
        }
    }
}

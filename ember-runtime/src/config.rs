use once_cell::sync::OnceCell;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration loaded once at startup from environment variables.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Directory holding the persistent stores (servers, accounts, ledger, audit).
    pub state_dir: PathBuf,
    /// Bind address for the internal HTTP API.
    pub api_bind: String,
    /// URL the in-VM agent reaches the API at (goes into the boot descriptor).
    pub api_public_base: String,
    /// Bind address for the sleeper listener.
    pub sleeper_bind: String,
    /// Public IPv4 the subdomain DNS points at while a server sleeps.
    pub sleeper_ipv4: String,
    /// Idle read timeout for sleeper connections, in seconds.
    pub sleeper_read_timeout_secs: u64,
    /// Shared secret for the cron-trigger and wake endpoints.
    pub operator_secret: String,
    /// Timeout applied to every upstream HTTP call.
    pub http_timeout: Duration,

    pub compute_api_base: String,
    pub compute_api_token: String,
    pub vm_server_type: String,
    pub vm_image: String,
    pub vm_location: String,
    pub vm_poll_interval_secs: u64,
    pub vm_poll_attempts: u32,
    pub shutdown_wait_secs: u64,

    pub dns_api_base: String,
    pub dns_api_token: String,
    pub dns_zone_id: String,
    /// Apex the subdomains hang off, e.g. `play.example.net`.
    pub dns_zone_name: String,

    pub storage_api_base: String,
    pub storage_bucket: String,
    pub storage_access_key: String,
    pub storage_secret_key: String,

    /// Base URL override for artifact metadata APIs (tests); empty = upstream.
    pub artifact_api_base: Option<String>,

    /// Quantization chunk for metered runtime, in seconds.
    pub billing_interval_secs: u64,
    /// Grace window before the stuck reaper force-reclaims Initializing/Starting servers.
    pub stuck_grace_secs: u64,
    /// Fallback sweep cadence when no cron expression is configured.
    pub billing_sweep_secs: u64,
    pub idle_sweep_secs: u64,
    pub stuck_sweep_secs: u64,
    /// Optional cron expressions overriding the fixed sweep cadences.
    pub billing_cron: Option<String>,
    pub idle_cron: Option<String>,
    pub stuck_cron: Option<String>,
}

static RUNTIME_CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    /// Cached after the first call; subsequent calls return the same config.
    pub fn load() -> &'static RuntimeConfig {
        RUNTIME_CONFIG.get_or_init(Self::from_env)
    }

    /// Build a config straight from the environment without caching.
    /// Used by tests that need fresh values; production code goes through `load()`.
    pub fn from_env() -> RuntimeConfig {
        RuntimeConfig {
            state_dir: env::var("EMBER_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ember-state")),
            api_bind: env_string("EMBER_API_BIND", "127.0.0.1:8360"),
            api_public_base: env_string("EMBER_API_PUBLIC_BASE", "http://127.0.0.1:8360"),
            sleeper_bind: env_string("EMBER_SLEEPER_BIND", "0.0.0.0:25565"),
            sleeper_ipv4: env_string("EMBER_SLEEPER_IPV4", "127.0.0.1"),
            sleeper_read_timeout_secs: env_u64("EMBER_SLEEPER_READ_TIMEOUT_SECS", 10),
            operator_secret: env_string("EMBER_OPERATOR_SECRET", ""),
            http_timeout: Duration::from_secs(env_u64("EMBER_HTTP_TIMEOUT_SECS", 30)),

            compute_api_base: env_string("EMBER_COMPUTE_API_BASE", "https://api.hetzner.cloud/v1"),
            compute_api_token: env_string("EMBER_COMPUTE_API_TOKEN", ""),
            vm_server_type: env_string("EMBER_VM_SERVER_TYPE", "cpx31"),
            vm_image: env_string("EMBER_VM_IMAGE", "ubuntu-24.04"),
            vm_location: env_string("EMBER_VM_LOCATION", "fsn1"),
            vm_poll_interval_secs: env_u64("EMBER_VM_POLL_INTERVAL_SECS", 2),
            vm_poll_attempts: env_u32("EMBER_VM_POLL_ATTEMPTS", 60),
            shutdown_wait_secs: env_u64("EMBER_SHUTDOWN_WAIT_SECS", 20),

            dns_api_base: env_string("EMBER_DNS_API_BASE", "https://api.cloudflare.com/client/v4"),
            dns_api_token: env_string("EMBER_DNS_API_TOKEN", ""),
            dns_zone_id: env_string("EMBER_DNS_ZONE_ID", ""),
            dns_zone_name: env_string("EMBER_DNS_ZONE_NAME", "example.net"),

            storage_api_base: env_string("EMBER_STORAGE_API_BASE", "http://127.0.0.1:9000"),
            storage_bucket: env_string("EMBER_STORAGE_BUCKET", "ember-servers"),
            storage_access_key: env_string("EMBER_STORAGE_ACCESS_KEY", ""),
            storage_secret_key: env_string("EMBER_STORAGE_SECRET_KEY", ""),

            artifact_api_base: env_opt("EMBER_ARTIFACT_API_BASE"),

            billing_interval_secs: env_u64("EMBER_BILLING_INTERVAL_SECS", 300),
            stuck_grace_secs: env_u64("EMBER_STUCK_GRACE_SECS", 1800),
            billing_sweep_secs: env_u64("EMBER_BILLING_SWEEP_SECS", 60),
            idle_sweep_secs: env_u64("EMBER_IDLE_SWEEP_SECS", 60),
            stuck_sweep_secs: env_u64("EMBER_STUCK_SWEEP_SECS", 300),
            billing_cron: env_opt("EMBER_BILLING_CRON"),
            idle_cron: env_opt("EMBER_IDLE_CRON"),
            stuck_cron: env_opt("EMBER_STUCK_CRON"),
        }
    }
}

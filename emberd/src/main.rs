//! Ember orchestrator daemon.
//!
//! Wires the three long-lived surfaces together: the sleeper TCP listener,
//! the internal HTTP API and the reconciliation job scheduler, all sharing
//! one `Runtime`.

mod directory;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use ember_runtime::api;
use ember_runtime::reaper;
use ember_runtime::scheduler;
use ember_runtime::{Runtime, RuntimeConfig};
use ember_sleeper::ServerDirectory;

use crate::directory::RuntimeDirectory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_log();

    let config = RuntimeConfig::load().clone();
    let sleeper_bind = config.sleeper_bind.clone();
    let api_bind = config.api_bind.clone();
    let read_timeout = Duration::from_secs(config.sleeper_read_timeout_secs);

    let rt = Arc::new(Runtime::open_with_http_providers(config)?);

    // Converge store state with compute reality before serving anything.
    reaper::reconcile_on_startup(&rt).await;

    let _jobs = scheduler::spawn_jobs(rt.clone());

    let sleeper_socket = tokio::net::TcpListener::bind(&sleeper_bind).await?;
    let sleeper_directory: Arc<dyn ServerDirectory> = Arc::new(RuntimeDirectory::new(rt.clone()));
    tokio::spawn(async move {
        if let Err(err) = ember_sleeper::serve(sleeper_socket, sleeper_directory, read_timeout).await
        {
            error!("sleeper: listener exited: {err}");
        }
    });

    let api_socket = tokio::net::TcpListener::bind(&api_bind).await?;
    info!("api: listening on {api_bind}");
    axum::serve(api_socket, api::router(rt)).await?;
    Ok(())
}

fn setup_log() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

//! In-memory wake progress tracking.
//!
//! Dashboards poll creation status while a wake is in flight rather than
//! waiting for the full provision to complete. Purely informational; the
//! lifecycle store stays the source of truth.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::util::now_ts;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakePhase {
    Queued,
    ZombieSweep,
    Artifact,
    VmAllocate,
    DnsSwap,
    Booting,
    Failed,
}

impl WakePhase {
    /// Progress percentage (0–100) for UI rendering.
    pub fn progress_pct(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::ZombieSweep => 15,
            Self::Artifact => 30,
            Self::VmAllocate => 55,
            Self::DnsSwap => 80,
            Self::Booting => 100,
            Self::Failed => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Booting | Self::Failed)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WakeProgress {
    pub server_id: String,
    pub phase: WakePhase,
    pub message: Option<String>,
    pub started_at: u64,
    pub updated_at: u64,
    pub progress_pct: u8,
}

static WAKES: Lazy<Mutex<HashMap<String, WakeProgress>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub fn start(server_id: &str) {
    let now = now_ts();
    let status = WakeProgress {
        server_id: server_id.to_string(),
        phase: WakePhase::Queued,
        message: None,
        started_at: now,
        updated_at: now,
        progress_pct: 0,
    };
    WAKES.lock().unwrap().insert(server_id.to_string(), status);
}

pub fn advance(server_id: &str, phase: WakePhase) {
    let mut map = WAKES.lock().unwrap();
    if let Some(status) = map.get_mut(server_id) {
        status.phase = phase;
        status.progress_pct = phase.progress_pct();
        status.updated_at = now_ts();
    }
}

pub fn fail(server_id: &str, message: &str) {
    let mut map = WAKES.lock().unwrap();
    if let Some(status) = map.get_mut(server_id) {
        status.phase = WakePhase::Failed;
        status.progress_pct = 0;
        status.message = Some(message.to_string());
        status.updated_at = now_ts();
    }
}

pub fn get(server_id: &str) -> Option<WakeProgress> {
    WAKES.lock().unwrap().get(server_id).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_and_fail() {
        start("srv-p");
        advance("srv-p", WakePhase::VmAllocate);
        let status = get("srv-p").unwrap();
        assert_eq!(status.phase, WakePhase::VmAllocate);
        assert_eq!(status.progress_pct, 55);

        fail("srv-p", "compute quota exceeded");
        let status = get("srv-p").unwrap();
        assert_eq!(status.phase, WakePhase::Failed);
        assert!(status.message.unwrap().contains("quota"));
    }
}

//! Synthetic server-list status for sleeping servers.
//!
//! Protocol number -1 deliberately reads as "incompatible" to game clients
//! so the entry can never trigger an actual join attempt; the MOTD carries a
//! human-readable sleeping marker instead.

use serde::{Deserialize, Serialize};

pub const SLEEPING_PROTOCOL: i32 = -1;
pub const SLEEPING_NAME: &str = "Sleeping";
pub const SLEEPING_SUFFIX: &str = " (Server Sleeping)";
pub const UNKNOWN_MOTD: &str = "Unknown server";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: VersionInfo,
    pub players: PlayerCounts,
    pub description: Description,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub protocol: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerCounts {
    pub max: i32,
    pub online: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
}

/// Build the canned response for a sleeping (or unknown) server.
pub fn sleeping_status(motd: Option<&str>) -> StatusResponse {
    let base = motd.unwrap_or(UNKNOWN_MOTD);
    StatusResponse {
        version: VersionInfo {
            name: SLEEPING_NAME.to_string(),
            protocol: SLEEPING_PROTOCOL,
        },
        players: PlayerCounts { max: 0, online: 0 },
        description: Description {
            text: format!("{base}{SLEEPING_SUFFIX}"),
        },
    }
}

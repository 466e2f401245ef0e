use serde::{Deserialize, Serialize};

/// One immutable deduction from an account's credit balance.
/// `session_id` attributes the charge to a single Stopped -> ... -> Stopped run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub account_id: String,
    pub server_id: String,
    pub session_id: String,
    /// Metered seconds this entry covers.
    pub seconds: u64,
    pub cost: f64,
    pub balance_after: f64,
    pub at: u64,
}

/// One lifecycle-affecting action: who/what triggered each wake, teardown or
/// forced reclamation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub server_id: String,
    pub action: String,
    pub trigger: String,
    pub detail: String,
    pub at: u64,
}

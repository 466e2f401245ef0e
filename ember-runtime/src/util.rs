use chrono::Utc;
use once_cell::sync::OnceCell;
use reqwest::Client;
use std::time::Duration;

use crate::error::{EmberError, Result};

static HTTP_CLIENT: OnceCell<Client> = OnceCell::new();

/// Unix seconds, clamped to zero.
pub fn now_ts() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Shared HTTP client for all upstream providers.
/// Built once with the configured timeout; later timeout values are ignored.
pub fn http_client(timeout: Duration) -> Result<&'static Client> {
    HTTP_CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EmberError::Validation(format!("failed to build HTTP client: {err}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ts_is_positive() {
        assert!(now_ts() > 1_700_000_000);
    }
}

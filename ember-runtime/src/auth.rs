use axum::http::HeaderMap;
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::config::RuntimeConfig;
use crate::error::{EmberError, Result};

/// Header carrying the operator secret on cron-trigger and wake endpoints.
pub const OPERATOR_SECRET_HEADER: &str = "x-operator-secret";

/// Generate a fresh per-server shared secret (32 random bytes, hex).
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time bearer comparison.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Extract the bearer token from an `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| EmberError::Auth("missing Authorization header".into()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| EmberError::Auth("Authorization header is not a bearer token".into()))?;
    if token.trim().is_empty() {
        return Err(EmberError::Auth("empty bearer token".into()));
    }
    Ok(token.trim().to_string())
}

/// Reject callers that don't present the configured operator secret.
pub fn require_operator(headers: &HeaderMap, config: &RuntimeConfig) -> Result<()> {
    if config.operator_secret.is_empty() {
        return Err(EmberError::Auth("operator secret is not configured".into()));
    }
    let presented = headers
        .get(OPERATOR_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !secrets_match(&config.operator_secret, presented) {
        return Err(EmberError::Auth("bad operator secret".into()));
    }
    Ok(())
}

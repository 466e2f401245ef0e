use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;

use crate::error::{EmberError, Result};
use crate::util::http_client;

pub fn build_url(base: &str, path: &str) -> Result<Url> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|err| EmberError::Validation(format!("invalid URL {joined}: {err}")))
}

pub fn auth_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| EmberError::Auth("invalid API token".into()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Issue a JSON request. Transport failures come back as a plain message so
/// each provider client can wrap them in its own error variant.
pub async fn send_json(
    method: Method,
    url: Url,
    body: Option<Value>,
    headers: HeaderMap,
    timeout: Duration,
) -> std::result::Result<(StatusCode, String), String> {
    let client = http_client(timeout).map_err(|err| err.to_string())?;
    let mut request = client.request(method, url).headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .map_err(|err| format!("request failed: {err}"))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| format!("failed to read response body: {err}"))?;

    Ok((status, text))
}

/// Parse a JSON body, mapping failures onto the caller's error constructor.
pub fn parse_json<E>(body: &str, err: E) -> Result<Value>
where
    E: FnOnce(String) -> EmberError,
{
    serde_json::from_str(body).map_err(|e| err(format!("invalid JSON response: {e}")))
}

//! Cloud VM provider client.
//!
//! Thin REST wrapper: create/list/delete servers, poll asynchronous actions,
//! request a graceful power-off. The provisioner owns ordering and retries;
//! failures surface as `EmberError::Compute` and abort the current attempt.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;

use crate::error::{EmberError, Result};
use crate::http::{auth_headers, build_url, parse_json, send_json};

/// A VM as reported by the provider.
#[derive(Clone, Debug)]
pub struct VmInfo {
    pub id: u64,
    pub name: String,
    pub ipv4: Option<String>,
    pub power_on: bool,
}

/// Result of a create call: the VM plus the async action to poll.
#[derive(Clone, Debug)]
pub struct VmCreated {
    pub vm_id: u64,
    pub action_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

/// Parameters for VM allocation; `user_data` is the rendered first-boot
/// descriptor and is opaque at this layer.
#[derive(Clone, Debug)]
pub struct VmCreateRequest {
    pub name: String,
    pub server_type: String,
    pub image: String,
    pub location: String,
    pub user_data: String,
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn list_by_name(&self, name: &str) -> Result<Vec<VmInfo>>;
    async fn create(&self, request: &VmCreateRequest) -> Result<VmCreated>;
    async fn action_status(&self, action_id: u64) -> Result<ActionStatus>;
    async fn get(&self, vm_id: u64) -> Result<VmInfo>;
    /// Graceful ACPI power-off signal.
    async fn shutdown(&self, vm_id: u64) -> Result<()>;
    /// Immediate delete; also the zombie-cleanup path.
    async fn delete(&self, vm_id: u64) -> Result<()>;
}

/// REST implementation against a Hetzner-Cloud-shaped API.
pub struct HttpComputeProvider {
    base: String,
    token: String,
    timeout: Duration,
}

impl HttpComputeProvider {
    pub fn new(base: String, token: String, timeout: Duration) -> Self {
        Self {
            base,
            token,
            timeout,
        }
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = build_url(&self.base, path)?;
        let headers = auth_headers(&self.token)?;
        let (status, text) = send_json(method, url, body, headers, self.timeout)
            .await
            .map_err(EmberError::Compute)?;
        if !status.is_success() {
            return Err(EmberError::Compute(format!("{path}: HTTP {status}: {text}")));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        parse_json(&text, EmberError::Compute)
    }
}

fn vm_from_json(value: &Value) -> Result<VmInfo> {
    let id = value
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| EmberError::Compute("server payload missing id".into()))?;
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let ipv4 = value
        .get("public_net")
        .and_then(|net| net.get("ipv4"))
        .and_then(|ip| ip.get("ip"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let power_on = value
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s == "running")
        .unwrap_or(false);
    Ok(VmInfo {
        id,
        name,
        ipv4,
        power_on,
    })
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn list_by_name(&self, name: &str) -> Result<Vec<VmInfo>> {
        let body = self
            .call(Method::GET, &format!("/servers?name={name}"), None)
            .await?;
        let servers = body
            .get("servers")
            .and_then(Value::as_array)
            .ok_or_else(|| EmberError::Compute("list response missing servers".into()))?;
        servers.iter().map(vm_from_json).collect()
    }

    async fn create(&self, request: &VmCreateRequest) -> Result<VmCreated> {
        let user_data = base64::engine::general_purpose::STANDARD.encode(&request.user_data);
        let payload = json!({
            "name": request.name,
            "server_type": request.server_type,
            "image": request.image,
            "location": request.location,
            "user_data": user_data,
            "labels": { "managed-by": "ember" },
        });
        let body = self.call(Method::POST, "/servers", Some(payload)).await?;
        let vm_id = body
            .get("server")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| EmberError::Compute("create response missing server.id".into()))?;
        let action_id = body
            .get("action")
            .and_then(|a| a.get("id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| EmberError::Compute("create response missing action.id".into()))?;
        Ok(VmCreated { vm_id, action_id })
    }

    async fn action_status(&self, action_id: u64) -> Result<ActionStatus> {
        let body = self
            .call(Method::GET, &format!("/actions/{action_id}"), None)
            .await?;
        let status = body
            .get("action")
            .and_then(|a| a.get("status"))
            .and_then(Value::as_str)
            .ok_or_else(|| EmberError::Compute("action response missing status".into()))?;
        match status {
            "running" => Ok(ActionStatus::Running),
            "success" => Ok(ActionStatus::Success),
            _ => Ok(ActionStatus::Error),
        }
    }

    async fn get(&self, vm_id: u64) -> Result<VmInfo> {
        let body = self
            .call(Method::GET, &format!("/servers/{vm_id}"), None)
            .await?;
        let server = body
            .get("server")
            .ok_or_else(|| EmberError::Compute("get response missing server".into()))?;
        vm_from_json(server)
    }

    async fn shutdown(&self, vm_id: u64) -> Result<()> {
        self.call(
            Method::POST,
            &format!("/servers/{vm_id}/actions/shutdown"),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, vm_id: u64) -> Result<()> {
        self.call(Method::DELETE, &format!("/servers/{vm_id}"), None)
            .await?;
        Ok(())
    }
}

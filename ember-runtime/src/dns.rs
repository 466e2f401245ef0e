//! DNS provider client.
//!
//! A subdomain either points at the sleeper proxy (placeholder records) or at
//! the allocated VM. The provisioner swaps between the two by deleting every
//! existing A/SRV record for the name and recreating the pair; an SRV record
//! is kept alongside the A record for game-client auto-discovery.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;

use crate::error::{EmberError, Result};
use crate::http::{auth_headers, build_url, parse_json, send_json};

#[derive(Clone, Debug)]
pub struct DnsRecord {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct DnsRecordSpec {
    pub kind: String,
    pub name: String,
    pub content: String,
}

#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn list_records(&self, name: &str) -> Result<Vec<DnsRecord>>;
    async fn create_record(&self, spec: &DnsRecordSpec) -> Result<()>;
    async fn delete_record(&self, id: &str) -> Result<()>;
}

/// REST implementation against a Cloudflare-shaped API.
pub struct HttpDnsProvider {
    base: String,
    token: String,
    zone_id: String,
    timeout: Duration,
}

impl HttpDnsProvider {
    pub fn new(base: String, token: String, zone_id: String, timeout: Duration) -> Self {
        Self {
            base,
            token,
            zone_id,
            timeout,
        }
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = build_url(&self.base, path)?;
        let headers = auth_headers(&self.token)?;
        let (status, text) = send_json(method, url, body, headers, self.timeout)
            .await
            .map_err(EmberError::Dns)?;
        if !status.is_success() {
            return Err(EmberError::Dns(format!("{path}: HTTP {status}: {text}")));
        }
        parse_json(&text, EmberError::Dns)
    }
}

#[async_trait]
impl DnsProvider for HttpDnsProvider {
    async fn list_records(&self, name: &str) -> Result<Vec<DnsRecord>> {
        let body = self
            .call(
                Method::GET,
                &format!("/zones/{}/dns_records?name={name}", self.zone_id),
                None,
            )
            .await?;
        let result = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| EmberError::Dns("list response missing result".into()))?;
        result
            .iter()
            .map(|rec| {
                let id = rec
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| EmberError::Dns("record missing id".into()))?;
                Ok(DnsRecord {
                    id: id.to_string(),
                    kind: rec
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: rec
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    content: rec
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect()
    }

    async fn create_record(&self, spec: &DnsRecordSpec) -> Result<()> {
        let payload = json!({
            "type": spec.kind,
            "name": spec.name,
            "content": spec.content,
            "ttl": 60,
            "proxied": false,
        });
        self.call(
            Method::POST,
            &format!("/zones/{}/dns_records", self.zone_id),
            Some(payload),
        )
        .await?;
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/zones/{}/dns_records/{id}", self.zone_id),
            None,
        )
        .await?;
        Ok(())
    }
}

/// Fully-qualified host for a subdomain.
pub fn fqdn(subdomain: &str, zone_name: &str) -> String {
    format!("{subdomain}.{zone_name}")
}

/// SRV owner name for game-client discovery.
pub fn srv_name(subdomain: &str, zone_name: &str) -> String {
    format!("_minecraft._tcp.{subdomain}.{zone_name}")
}

/// Point a subdomain at an address: drop whatever A/SRV records exist for the
/// name, then create the pair. Used both for the VM swap and the sleeper reset.
pub async fn repoint(
    dns: &dyn DnsProvider,
    subdomain: &str,
    zone_name: &str,
    ipv4: &str,
) -> Result<()> {
    let host = fqdn(subdomain, zone_name);
    let srv = srv_name(subdomain, zone_name);

    for name in [host.as_str(), srv.as_str()] {
        for record in dns.list_records(name).await? {
            dns.delete_record(&record.id).await?;
        }
    }

    dns.create_record(&DnsRecordSpec {
        kind: "A".into(),
        name: host.clone(),
        content: ipv4.to_string(),
    })
    .await?;
    dns.create_record(&DnsRecordSpec {
        kind: "SRV".into(),
        name: srv,
        content: format!("0 5 25565 {host}"),
    })
    .await?;
    Ok(())
}

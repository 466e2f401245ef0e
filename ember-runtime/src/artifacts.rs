//! Software artifact resolution.
//!
//! Maps a (software, version) pair to the concrete server-jar download URL by
//! querying the relevant upstream metadata API. Deterministic data fetching;
//! each family has its own small resolver.

use reqwest::Method;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EmberError, Result};
use crate::http::{build_url, parse_json, send_json};

/// Supported game-software families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Software {
    Vanilla,
    Paper,
    Purpur,
    Fabric,
    Velocity,
}

impl Software {
    pub fn as_str(self) -> &'static str {
        match self {
            Software::Vanilla => "vanilla",
            Software::Paper => "paper",
            Software::Purpur => "purpur",
            Software::Fabric => "fabric",
            Software::Velocity => "velocity",
        }
    }
}

impl FromStr for Software {
    type Err = EmberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vanilla" => Ok(Software::Vanilla),
            "paper" => Ok(Software::Paper),
            "purpur" => Ok(Software::Purpur),
            "fabric" => Ok(Software::Fabric),
            "velocity" => Ok(Software::Velocity),
            other => Err(EmberError::Validation(format!("unknown software: {other}"))),
        }
    }
}

impl std::fmt::Display for Software {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ArtifactResolver {
    /// When set, every upstream metadata call goes through this base instead
    /// of the real endpoints. Used by tests.
    base_override: Option<String>,
    timeout: Duration,
}

impl ArtifactResolver {
    pub fn new(base_override: Option<String>, timeout: Duration) -> Self {
        Self {
            base_override,
            timeout,
        }
    }

    fn base(&self, upstream: &str) -> String {
        self.base_override
            .clone()
            .unwrap_or_else(|| upstream.to_string())
    }

    async fn fetch(&self, base: &str, path: &str) -> Result<Value> {
        let url = build_url(base, path)?;
        let (status, text) = send_json(
            Method::GET,
            url,
            None,
            reqwest::header::HeaderMap::new(),
            self.timeout,
        )
        .await
        .map_err(EmberError::Artifact)?;
        if !status.is_success() {
            return Err(EmberError::Artifact(format!(
                "{path}: HTTP {status}: {text}"
            )));
        }
        parse_json(&text, EmberError::Artifact)
    }

    /// Resolve the download URL for the requested software/version pair.
    pub async fn resolve(&self, software: Software, version: &str) -> Result<String> {
        if version.trim().is_empty() {
            return Err(EmberError::Validation("version must not be empty".into()));
        }
        match software {
            Software::Paper => self.resolve_paper_family("paper", version).await,
            Software::Velocity => self.resolve_paper_family("velocity", version).await,
            Software::Purpur => self.resolve_purpur(version).await,
            Software::Fabric => self.resolve_fabric(version).await,
            Software::Vanilla => self.resolve_vanilla(version).await,
        }
    }

    /// PaperMC family: latest build for the version, then the named download.
    async fn resolve_paper_family(&self, project: &str, version: &str) -> Result<String> {
        let base = self.base("https://api.papermc.io");
        let path = format!("/v2/projects/{project}/versions/{version}/builds");
        let body = self.fetch(&base, &path).await?;
        let build = body
            .get("builds")
            .and_then(Value::as_array)
            .and_then(|builds| builds.last())
            .ok_or_else(|| {
                EmberError::Artifact(format!("no {project} builds for version {version}"))
            })?;
        let number = build
            .get("build")
            .and_then(Value::as_u64)
            .ok_or_else(|| EmberError::Artifact("build entry missing number".into()))?;
        let jar = build
            .get("downloads")
            .and_then(|d| d.get("application"))
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| EmberError::Artifact("build entry missing download name".into()))?;
        Ok(format!(
            "{base}/v2/projects/{project}/versions/{version}/builds/{number}/downloads/{jar}"
        ))
    }

    /// Purpur: the latest endpoint names the build; the download URL is fixed-shape.
    async fn resolve_purpur(&self, version: &str) -> Result<String> {
        let base = self.base("https://api.purpurmc.org");
        let body = self.fetch(&base, &format!("/v2/purpur/{version}")).await?;
        let build = body
            .get("builds")
            .and_then(|b| b.get("latest"))
            .and_then(Value::as_str)
            .ok_or_else(|| EmberError::Artifact(format!("no purpur builds for {version}")))?;
        Ok(format!("{base}/v2/purpur/{version}/{build}/download"))
    }

    /// Fabric: stable loader + installer for the game version.
    async fn resolve_fabric(&self, version: &str) -> Result<String> {
        let base = self.base("https://meta.fabricmc.net");
        let loaders = self
            .fetch(&base, &format!("/v2/versions/loader/{version}"))
            .await?;
        let loader = loaders
            .as_array()
            .and_then(|l| l.first())
            .and_then(|entry| entry.get("loader"))
            .and_then(|l| l.get("version"))
            .and_then(Value::as_str)
            .ok_or_else(|| EmberError::Artifact(format!("no fabric loader for {version}")))?;
        let installers = self.fetch(&base, "/v2/versions/installer").await?;
        let installer = installers
            .as_array()
            .and_then(|l| l.first())
            .and_then(|entry| entry.get("version"))
            .and_then(Value::as_str)
            .ok_or_else(|| EmberError::Artifact("no fabric installer versions".into()))?;
        Ok(format!(
            "{base}/v2/versions/loader/{version}/{loader}/{installer}/server/jar"
        ))
    }

    /// Vanilla: manifest lookup, then the per-version JSON carries the jar URL.
    async fn resolve_vanilla(&self, version: &str) -> Result<String> {
        let base = self.base("https://piston-meta.mojang.com");
        let manifest = self.fetch(&base, "/mc/game/version_manifest_v2.json").await?;
        let entry_url = manifest
            .get("versions")
            .and_then(Value::as_array)
            .and_then(|versions| {
                versions.iter().find(|v| {
                    v.get("id").and_then(Value::as_str) == Some(version)
                })
            })
            .and_then(|v| v.get("url"))
            .and_then(Value::as_str)
            .ok_or_else(|| EmberError::Artifact(format!("unknown vanilla version {version}")))?
            .to_string();

        // Per-version metadata may live on a different host; honor the
        // override by rewriting only the path when one is set.
        let (detail_base, detail_path) = match &self.base_override {
            Some(base) => {
                let path = reqwest::Url::parse(&entry_url)
                    .map(|u| u.path().to_string())
                    .map_err(|err| EmberError::Artifact(format!("bad manifest URL: {err}")))?;
                (base.clone(), path)
            }
            None => {
                let url = reqwest::Url::parse(&entry_url)
                    .map_err(|err| EmberError::Artifact(format!("bad manifest URL: {err}")))?;
                let origin = format!(
                    "{}://{}",
                    url.scheme(),
                    url.host_str().unwrap_or_default()
                );
                (origin, url.path().to_string())
            }
        };
        let detail = self.fetch(&detail_base, &detail_path).await?;
        detail
            .get("downloads")
            .and_then(|d| d.get("server"))
            .and_then(|s| s.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EmberError::Artifact(format!("version {version} has no server jar")))
    }
}

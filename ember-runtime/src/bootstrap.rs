//! First-boot descriptor rendering.
//!
//! Produces the cloud-init document a fresh VM boots with: the agent
//! environment file (shared secret, artifact URL, storage scope, API
//! callback) and the unit definitions for the in-VM processes. Opaque text
//! beyond this module; no orchestration logic belongs in the template.

/// Inputs to the rendered descriptor.
#[derive(Clone, Debug)]
pub struct BootstrapParams {
    pub server_id: String,
    pub session_id: String,
    pub shared_secret: String,
    pub artifact_url: String,
    pub api_base: String,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_prefix: String,
    pub storage_access_key: String,
    pub storage_secret_key: String,
    pub fresh_install: bool,
}

pub fn render_user_data(params: &BootstrapParams) -> String {
    format!(
        r#"#cloud-config
write_files:
  - path: /etc/ember/agent.env
    permissions: "0600"
    content: |
      EMBER_SERVER_ID={server_id}
      EMBER_SESSION_ID={session_id}
      EMBER_SHARED_SECRET={shared_secret}
      EMBER_API_BASE={api_base}
      EMBER_ARTIFACT_URL={artifact_url}
      EMBER_STORAGE_ENDPOINT={storage_endpoint}
      EMBER_STORAGE_BUCKET={storage_bucket}
      EMBER_STORAGE_PREFIX={storage_prefix}
      EMBER_STORAGE_ACCESS_KEY={storage_access_key}
      EMBER_STORAGE_SECRET_KEY={storage_secret_key}
      EMBER_FRESH_INSTALL={fresh_install}
  - path: /etc/systemd/system/ember-game.service
    content: |
      [Unit]
      Description=Game process supervisor
      After=network-online.target ember-sync.service
      [Service]
      EnvironmentFile=/etc/ember/agent.env
      ExecStart=/opt/ember/bin/ember-agent game
      Restart=on-failure
      [Install]
      WantedBy=multi-user.target
  - path: /etc/systemd/system/ember-heartbeat.service
    content: |
      [Unit]
      Description=Heartbeat reporter
      After=ember-game.service
      [Service]
      EnvironmentFile=/etc/ember/agent.env
      ExecStart=/opt/ember/bin/ember-agent heartbeat
      Restart=always
      [Install]
      WantedBy=multi-user.target
  - path: /etc/systemd/system/ember-sync.service
    content: |
      [Unit]
      Description=World sync and sidecars (files, console, metrics)
      [Service]
      EnvironmentFile=/etc/ember/agent.env
      ExecStart=/opt/ember/bin/ember-agent sync
      Restart=always
      [Install]
      WantedBy=multi-user.target
runcmd:
  - systemctl daemon-reload
  - systemctl enable --now ember-sync.service ember-game.service ember-heartbeat.service
"#,
        server_id = params.server_id,
        session_id = params.session_id,
        shared_secret = params.shared_secret,
        api_base = params.api_base,
        artifact_url = params.artifact_url,
        storage_endpoint = params.storage_endpoint,
        storage_bucket = params.storage_bucket,
        storage_prefix = params.storage_prefix,
        storage_access_key = params.storage_access_key,
        storage_secret_key = params.storage_secret_key,
        fresh_install = params.fresh_install,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_embeds_secret_and_artifact() {
        let rendered = render_user_data(&BootstrapParams {
            server_id: "srv-9".into(),
            session_id: "sess-1".into(),
            shared_secret: "topsecret".into(),
            artifact_url: "https://example.net/paper.jar".into(),
            api_base: "https://panel.example.net".into(),
            storage_endpoint: "http://storage".into(),
            storage_bucket: "ember-servers".into(),
            storage_prefix: "servers/srv-9/".into(),
            storage_access_key: "ak".into(),
            storage_secret_key: "sk".into(),
            fresh_install: true,
        });
        assert!(rendered.starts_with("#cloud-config"));
        assert!(rendered.contains("EMBER_SHARED_SECRET=topsecret"));
        assert!(rendered.contains("EMBER_ARTIFACT_URL=https://example.net/paper.jar"));
        assert!(rendered.contains("EMBER_FRESH_INSTALL=true"));
        assert!(rendered.contains("ember-heartbeat.service"));
    }
}

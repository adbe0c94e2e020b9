use crate::error::ClientError;
use crate::reconcile::thread_picker::AutoPick;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
  pub server_url: String,
  pub ws_path: String,
  pub connect_timeout_ms: u64,
  pub request_timeout_ms: u64,
  pub auto_pick: AutoPick,
  pub log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      server_url: "http://localhost:8080".to_string(),
      ws_path: "/api/ws".to_string(),
      connect_timeout_ms: 15_000,
      request_timeout_ms: 60_000,
      auto_pick: AutoPick::SingleRow,
      log_dir: None,
    }
  }
}

impl ClientConfig {
  /// Defaults, overlaid with `VRIPPER_SERVER_URL`, `VRIPPER_WS_PATH` and
  /// `VRIPPER_LOG_DIR` when set.
  pub fn from_env() -> anyhow::Result<Self> {
    Self::default().overlay(|key| std::env::var(key).ok())
  }

  pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
    let cfg: Self = serde_json::from_str(raw).context("invalid client config json")?;
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn from_file(path: &Path) -> anyhow::Result<Self> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Self::from_json_str(&raw)
  }

  fn overlay(mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
    let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(v) = non_empty("VRIPPER_SERVER_URL") {
      self.server_url = v;
    }
    if let Some(v) = non_empty("VRIPPER_WS_PATH") {
      self.ws_path = v;
    }
    if let Some(v) = non_empty("VRIPPER_LOG_DIR") {
      self.log_dir = Some(PathBuf::from(v));
    }
    self.validate()?;
    Ok(self)
  }

  fn validate(&self) -> anyhow::Result<()> {
    self.base_url().context("server_url is not a usable http(s) url")?;
    Ok(())
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_millis(self.request_timeout_ms)
  }

  fn base_url(&self) -> Result<Url, ClientError> {
    let url = Url::parse(&self.server_url)?;
    match url.scheme() {
      "http" | "https" => Ok(url),
      other => Err(ClientError::InvalidLink(format!("unsupported scheme {other}"))),
    }
  }

  /// `server_url` with `path` appended to whatever base path it carries.
  pub fn http_url(&self, path: &str) -> Result<Url, ClientError> {
    let mut url = self.base_url()?;
    let joined = format!("{}/{}", url.path().trim_end_matches('/'), path.trim_start_matches('/'));
    url.set_path(&joined);
    Ok(url)
  }

  /// The socket endpoint: `http` maps to `ws`, `https` to `wss`.
  pub fn ws_url(&self) -> Result<Url, ClientError> {
    let mut url = self.http_url(&self.ws_path)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url
      .set_scheme(scheme)
      .map_err(|_| ClientError::InvalidLink(self.server_url.clone()))?;
    Ok(url)
  }
}

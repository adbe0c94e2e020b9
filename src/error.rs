use anyhow::Context;
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  #[error("failed to connect to {url}: {reason}")]
  Connect { url: String, reason: String },
  #[error("channel is closed")]
  ChannelClosed,
  #[error("failed to encode message: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("server responded with {status}: {message}")]
  Http { status: u16, message: String },
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("invalid url: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("unsupported thread link: {0}")]
  InvalidLink(String),
}

impl ClientError {
  pub fn is_retryable(&self) -> bool {
    match self {
      ClientError::Connect { .. } | ClientError::ChannelClosed => true,
      ClientError::Http { status, .. } => *status >= 500,
      ClientError::Request(e) => e.is_timeout() || e.is_connect(),
      ClientError::Encode(_) | ClientError::InvalidUrl(_) | ClientError::InvalidLink(_) => false,
    }
  }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

pub fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<()> {
  let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    tracing_subscriber::EnvFilter::new("info,reqwest=warn,hyper=warn,tungstenite=warn")
  });

  let Some(dir) = log_dir else {
    return tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_writer(std::io::stderr)
      .try_init()
      .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"));
  };

  std::fs::create_dir_all(dir).context("failed to create logs dir")?;
  // Rotate daily; one JSON object per line.
  let file_appender = tracing_appender::rolling::daily(dir, "vripper-client.jsonl");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
  let _ = LOG_GUARD.set(guard);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(non_blocking)
    .json()
    .with_current_span(true)
    .with_span_list(true)
    .try_init()
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

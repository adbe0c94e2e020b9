use crate::backend::BackendClient;
use crate::config::ClientConfig;
use crate::connection::ConnectionProvider;
use crate::error::Result;
use crate::links::ThreadLink;
use crate::model::ThreadParseEntry;
use crate::session::{PostGridWatch, ThreadWatch};
use crate::transport::{Connector, WsConnector};
use std::sync::Arc;

/// Everything a front end needs: one shared socket, the HTTP backend and the
/// settings both were built from.
#[derive(Clone)]
pub struct VripperClient {
  config: ClientConfig,
  connection: Arc<ConnectionProvider>,
  backend: BackendClient,
}

impl VripperClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let connector = WsConnector::new(config.ws_url()?, config.connect_timeout());
    Self::with_connector(config, connector)
  }

  pub fn with_connector(config: ClientConfig, connector: impl Connector) -> Result<Self> {
    let backend = BackendClient::new(config.clone())?;
    Ok(Self {
      connection: Arc::new(ConnectionProvider::new(connector)),
      backend,
      config,
    })
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  pub fn connection(&self) -> &ConnectionProvider {
    &self.connection
  }

  pub fn backend(&self) -> &BackendClient {
    &self.backend
  }

  /// Starts following one thread's parsing, connecting first if needed.
  pub async fn watch_thread<F>(&self, thread_id: &str, on_complete: F) -> Result<ThreadWatch>
  where
    F: FnOnce(ThreadParseEntry) + Send + 'static,
  {
    let channel = self.connection.get_connection().await?;
    ThreadWatch::start(&channel, thread_id, self.config.auto_pick, on_complete)
  }

  pub async fn watch_posts(&self) -> Result<PostGridWatch> {
    let channel = self.connection.get_connection().await?;
    PostGridWatch::start(&channel)
  }

  /// Queues the watch's current selection. Returns how many posts were sent.
  pub async fn submit_picks(&self, watch: &ThreadWatch) -> Result<usize> {
    let posts = watch.picker().submission();
    self.backend.add_posts(&posts).await?;
    Ok(posts.len())
  }

  /// Sends every supported link in `input` to the server for parsing.
  pub async fn queue_links(&self, input: &str) -> Result<Vec<ThreadLink>> {
    let links = ThreadLink::parse_many(input)?;
    if links.is_empty() {
      return Ok(links);
    }
    let urls = links.iter().map(|l| l.url.as_str()).collect::<Vec<_>>().join("\n");
    self.backend.queue_threads(&urls).await?;
    tracing::info!(count = links.len(), "queued thread links");
    Ok(links)
  }

  pub async fn shutdown(&self) {
    self.connection.teardown().await;
  }
}

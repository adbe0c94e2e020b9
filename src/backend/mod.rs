//! HTTP side of the server: queueing, lifecycle actions and thread grabs.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::model::{
  AltPostName, DownloadPath, PostId, PostToAdd, RemoveAllResult, RemoveResult, ThreadId, ThreadParseEntry, ThreadUrl,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

#[derive(Clone)]
pub struct BackendClient {
  http: reqwest::Client,
  config: ClientConfig,
}

fn build_client(config: &ClientConfig) -> Result<reqwest::Client> {
  let client = reqwest::Client::builder()
    .user_agent(concat!("vripper-client/", env!("CARGO_PKG_VERSION")))
    .redirect(reqwest::redirect::Policy::limited(10))
    .connect_timeout(config.connect_timeout())
    .timeout(config.request_timeout())
    .build()?;
  Ok(client)
}

impl BackendClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let http = build_client(&config)?;
    Ok(Self { http, config })
  }

  fn url(&self, path: &str) -> Result<Url> {
    self.config.http_url(path)
  }

  async fn send(&self, req: RequestBuilder) -> Result<Response> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let url = resp.url().clone();
    let message = resp.text().await.unwrap_or_default().trim().to_string();
    tracing::warn!(%url, status = status.as_u16(), "backend request rejected");
    Err(ClientError::Http {
      status: status.as_u16(),
      message: if message.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
      } else {
        message
      },
    })
  }

  async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
    let req = self.http.request(Method::POST, self.url(path)?).json(body);
    self.send(req).await?;
    Ok(())
  }

  async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    let req = self.http.request(Method::POST, self.url(path)?).json(body);
    Ok(self.send(req).await?.json::<T>().await?)
  }

  async fn post_empty(&self, path: &str) -> Result<Response> {
    self.send(self.http.request(Method::POST, self.url(path)?)).await
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let req = self.http.request(Method::GET, self.url(path)?);
    Ok(self.send(req).await?.json::<T>().await?)
  }

  /// Queues picked posts for download.
  pub async fn add_posts(&self, posts: &[PostToAdd]) -> Result<()> {
    if posts.is_empty() {
      return Ok(());
    }
    tracing::info!(count = posts.len(), "queueing posts");
    self.post_unit("/post/add", posts).await
  }

  /// Hands the server newline-separated thread links to parse and queue.
  pub async fn queue_threads(&self, urls: &str) -> Result<()> {
    self.post_unit("/post", &ThreadUrl { url: urls.to_string() }).await
  }

  pub async fn restart(&self, posts: &[PostId]) -> Result<()> {
    self.post_unit("/post/restart", posts).await
  }

  pub async fn restart_all(&self) -> Result<()> {
    self.post_empty("/post/restart/all").await.map(drop)
  }

  pub async fn stop(&self, posts: &[PostId]) -> Result<()> {
    self.post_unit("/post/stop", posts).await
  }

  pub async fn stop_all(&self) -> Result<()> {
    self.post_empty("/post/stop/all").await.map(drop)
  }

  /// Returns the ids the server actually removed.
  pub async fn remove(&self, posts: &[PostId]) -> Result<Vec<RemoveResult>> {
    self.post_json("/post/remove", posts).await
  }

  pub async fn clear_completed(&self) -> Result<RemoveAllResult> {
    Ok(self.post_empty("/post/clear/all").await?.json().await?)
  }

  /// Sets alternative folder names; the server echoes the names it applied.
  pub async fn rename(&self, names: &[AltPostName]) -> Result<Vec<AltPostName>> {
    if names.is_empty() {
      return Ok(Vec::new());
    }
    self.post_json("/post/rename", names).await
  }

  /// Resets each post's folder to the name of the first post in its thread.
  pub async fn rename_to_first(&self, posts: &[PostId]) -> Result<Vec<PostId>> {
    if posts.is_empty() {
      return Ok(Vec::new());
    }
    self.post_json("/post/rename/first", posts).await
  }

  pub async fn download_path(&self, post_id: &str) -> Result<DownloadPath> {
    self.get_json(&format!("/post/path/{}", urlencoding::encode(post_id))).await
  }

  /// Rows the server has cached for a thread it already parsed.
  pub async fn grab(&self, thread_id: &str) -> Result<Vec<ThreadParseEntry>> {
    self.get_json(&format!("/grab/{}", urlencoding::encode(thread_id))).await
  }

  pub async fn grab_remove(&self, thread_id: &str) -> Result<ThreadId> {
    let body = ThreadId { thread_id: thread_id.to_string() };
    self.post_json("/grab/remove", &body).await
  }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
  Pending,
  Downloading,
  Partial,
  Complete,
  Error,
  Stopped,
}

/// Download state of one post as broadcast by the server.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostState {
  pub post_id: String,
  #[serde(default)]
  pub thread_id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub url: String,
  pub status: PostStatus,
  #[serde(default)]
  pub progress: f64,
  #[serde(default)]
  pub done: i64,
  #[serde(default)]
  pub total: i64,
  #[serde(default)]
  pub hosts: Vec<String>,
  #[serde(default)]
  pub previews: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
  Start,
  Stop,
  Details,
  Remove,
  DownloadLocation,
}

impl PostState {
  /// A completed post with missing images can be started again.
  pub fn can_start(&self) -> bool {
    match self.status {
      PostStatus::Pending | PostStatus::Error | PostStatus::Stopped => true,
      PostStatus::Complete => self.progress != 100.0,
      PostStatus::Downloading | PostStatus::Partial => false,
    }
  }

  pub fn can_stop(&self) -> bool {
    matches!(self.status, PostStatus::Downloading | PostStatus::Partial)
  }

  pub fn has_started(&self) -> bool {
    self.done > 0
  }

  pub fn actions(&self) -> Vec<PostAction> {
    let mut out = Vec::with_capacity(4);
    if self.can_start() {
      out.push(PostAction::Start);
    }
    if self.can_stop() {
      out.push(PostAction::Stop);
    }
    out.push(PostAction::Details);
    out.push(PostAction::Remove);
    out.push(PostAction::DownloadLocation);
    out
  }
}

/// One post discovered while the server parses a thread.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadParseEntry {
  pub thread_id: String,
  pub post_id: String,
  #[serde(default)]
  pub title: String,
  pub url: String,
  #[serde(default)]
  pub number: i64,
  #[serde(default)]
  pub image_count: i64,
  #[serde(default)]
  pub previews: Vec<String>,
  #[serde(default)]
  pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadParseStatus {
  Running,
  End,
  Error,
  #[serde(other)]
  Unknown,
}

impl ThreadParseStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, ThreadParseStatus::End | ThreadParseStatus::Error)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadParseState {
  pub thread_id: String,
  pub state: ThreadParseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostToAdd {
  pub post_id: String,
  pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostId {
  pub post_id: String,
}

impl From<&str> for PostId {
  fn from(post_id: &str) -> Self {
    Self { post_id: post_id.to_string() }
  }
}

/// Folder name override for a post's download directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltPostName {
  pub post_id: String,
  pub alt_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveResult {
  pub post_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RemoveAllResult {
  pub removed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DownloadPath {
  pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThreadUrl {
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadId {
  pub thread_id: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn post(status: PostStatus, progress: f64) -> PostState {
    PostState {
      post_id: "p1".into(),
      thread_id: "t1".into(),
      title: "title".into(),
      url: "https://vipergirls.to/threads/1?p=1".into(),
      status,
      progress,
      done: 0,
      total: 10,
      hosts: vec![],
      previews: vec![],
    }
  }

  #[test]
  fn incomplete_finished_post_can_be_restarted() {
    assert!(post(PostStatus::Complete, 80.0).can_start());
    assert!(!post(PostStatus::Complete, 100.0).can_start());
    assert!(post(PostStatus::Stopped, 0.0).can_start());
  }

  #[test]
  fn running_posts_offer_stop_not_start() {
    let p = post(PostStatus::Partial, 40.0);
    assert_eq!(
      p.actions(),
      vec![PostAction::Stop, PostAction::Details, PostAction::Remove, PostAction::DownloadLocation]
    );
  }

  #[test]
  fn unknown_parse_state_does_not_fail_decoding() {
    let s: ThreadParseState = serde_json::from_str(r#"{"threadId":"1","state":"PAUSED"}"#).unwrap();
    assert_eq!(s.state, ThreadParseStatus::Unknown);
    assert!(!s.state.is_terminal());
  }

  #[test]
  fn post_state_decodes_with_missing_optional_columns() {
    let p: PostState =
      serde_json::from_str(r#"{"postId":"9","status":"DOWNLOADING","progress":12.5}"#).unwrap();
    assert_eq!(p.post_id, "9");
    assert_eq!(p.status, PostStatus::Downloading);
    assert!(p.hosts.is_empty());
  }
}

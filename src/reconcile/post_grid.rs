use super::{ApplyStats, Row, RowSet};
use crate::events::ServerEvent;
use crate::model::{PostAction, PostState, RemoveResult};

impl Row for PostState {
  type Key = String;

  fn key(&self) -> String {
    self.post_id.clone()
  }

  // Progress broadcasts may leave descriptive columns empty; keep what we had.
  fn merge(&mut self, update: Self) {
    let PostState {
      post_id: _,
      thread_id,
      title,
      url,
      status,
      progress,
      done,
      total,
      hosts,
      previews,
    } = update;
    self.status = status;
    self.progress = progress;
    self.done = done;
    self.total = total;
    if !thread_id.is_empty() {
      self.thread_id = thread_id;
    }
    if !title.is_empty() {
      self.title = title;
    }
    if !url.is_empty() {
      self.url = url;
    }
    if !hosts.is_empty() {
      self.hosts = hosts;
    }
    if !previews.is_empty() {
      self.previews = previews;
    }
  }
}

/// Local copy of the server's post list, updated in place by postId.
#[derive(Debug, Clone, Default)]
pub struct PostGrid {
  rows: RowSet<PostState>,
}

impl PostGrid {
  pub fn new() -> Self {
    Self::default()
  }

  /// Applies a posts-topic event; other events are ignored.
  pub fn apply(&mut self, event: &ServerEvent) -> ApplyStats {
    match event {
      ServerEvent::Posts(posts) => self.rows.apply(posts.iter().cloned()),
      ServerEvent::PostsRemoved(ids) => {
        let removed = ids.iter().filter(|id| self.rows.remove(id).is_some()).count();
        ApplyStats { removed, ..ApplyStats::default() }
      }
      ServerEvent::ThreadParsing(_) => ApplyStats::default(),
    }
  }

  pub fn upsert(&mut self, post: PostState) {
    self.rows.upsert(post);
  }

  /// Drops the rows the server reported as removed.
  pub fn apply_removed(&mut self, removed: &[RemoveResult]) -> usize {
    removed.iter().filter(|r| self.rows.remove(&r.post_id).is_some()).count()
  }

  pub fn get(&self, post_id: &str) -> Option<&PostState> {
    self.rows.get(&post_id.to_string())
  }

  pub fn actions(&self, post_id: &str) -> Vec<PostAction> {
    self.get(post_id).map(PostState::actions).unwrap_or_default()
  }

  pub fn rows(&self) -> &[PostState] {
    self.rows.rows()
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }
}

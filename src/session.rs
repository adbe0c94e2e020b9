//! Scoped subscriptions: each watch owns its token and releases it on drop.

use crate::connection::ChannelHandle;
use crate::error::Result;
use crate::events::{Interest, ServerEvent};
use crate::model::ThreadParseEntry;
use crate::reconcile::post_grid::PostGrid;
use crate::reconcile::thread_picker::{AutoPick, PickerPhase, PickerUpdate, ThreadPicker};
use crate::registry::Subscription;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tokio::sync::watch;

/// Follows the parsing of one thread. The token is released on the first
/// terminal state or when the watch is dropped, whichever comes first.
pub struct ThreadWatch {
  picker: Arc<Mutex<ThreadPicker>>,
  token: Arc<Mutex<Option<Subscription>>>,
  phase: watch::Receiver<PickerPhase>,
  auto_picked: Arc<Mutex<Option<ThreadParseEntry>>>,
}

impl ThreadWatch {
  /// `on_complete` runs at most once, with the single visible row, when
  /// parsing ends and auto-pick applies.
  pub fn start<F>(channel: &ChannelHandle, thread_id: &str, auto_pick: AutoPick, on_complete: F) -> Result<Self>
  where
    F: FnOnce(ThreadParseEntry) + Send + 'static,
  {
    let picker = Arc::new(Mutex::new(ThreadPicker::new(thread_id, auto_pick)));
    let token: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let auto_picked = Arc::new(Mutex::new(None));
    let (phase_tx, phase_rx) = watch::channel(PickerPhase::Idle);
    let phase_tx = Arc::new(phase_tx);

    // Subscribed before registering so no early batch is ignored.
    picker.lock().mark_subscribed();
    phase_tx.send_replace(PickerPhase::Subscribed);

    let callback = {
      let picker = picker.clone();
      let token = token.clone();
      let auto_picked = auto_picked.clone();
      let phase_tx = phase_tx.clone();
      let on_complete = Mutex::new(Some(on_complete));
      move |event: &ServerEvent| {
        let ServerEvent::ThreadParsing(batch) = event else { return };
        let update = picker.lock().apply(batch);
        let PickerUpdate::Ended { auto_pick, .. } = update else { return };

        if let Some(entry) = auto_pick {
          *auto_picked.lock() = Some(entry.clone());
          if let Some(f) = on_complete.lock().take() {
            f(entry);
          }
        }
        let released = token.lock().take();
        if let Some(sub) = released {
          sub.unsubscribe();
        }
        phase_tx.send_replace(picker.lock().phase());
      }
    };
    // Runs on release and when the channel goes away mid-parse.
    let on_close = {
      let picker = picker.clone();
      let phase_tx = phase_tx.clone();
      move || {
        let phase = {
          let mut picker = picker.lock();
          picker.finish();
          picker.phase()
        };
        phase_tx.send_replace(phase);
      }
    };

    let sub = match channel.registry().subscribe_with_close(Interest::thread(thread_id), callback, on_close) {
      Ok(sub) => sub,
      Err(e) => {
        picker.lock().finish();
        return Err(e);
      }
    };

    {
      // Lock order: token, then picker. The callback never holds both.
      let mut slot = token.lock();
      if picker.lock().phase().is_ended() {
        drop(slot);
        sub.unsubscribe();
      } else {
        *slot = Some(sub);
      }
    }

    tracing::debug!(thread_id, "watching thread parsing");
    Ok(Self { picker, token, phase: phase_rx, auto_picked })
  }

  pub fn picker(&self) -> MutexGuard<'_, ThreadPicker> {
    self.picker.lock()
  }

  pub fn phase(&self) -> PickerPhase {
    *self.phase.borrow()
  }

  pub fn auto_picked(&self) -> Option<ThreadParseEntry> {
    self.auto_picked.lock().clone()
  }

  /// Waits until parsing ends (or the watch is closed).
  pub async fn ended(&self) -> PickerPhase {
    let mut rx = self.phase.clone();
    let result = rx.wait_for(|p| p.is_ended()).await.map(|p| *p);
    result.unwrap_or_else(|_| self.picker.lock().phase())
  }

  /// False once parsing ended, the watch was closed or the channel went away.
  pub fn is_subscribed(&self) -> bool {
    !self.phase().is_ended() && self.token.lock().as_ref().is_some_and(Subscription::is_active)
  }

  /// Ends the watch early. Idempotent.
  pub fn close(&self) {
    self.picker.lock().finish();
    let released = self.token.lock().take();
    if let Some(sub) = released {
      sub.unsubscribe();
    }
  }
}

impl Drop for ThreadWatch {
  fn drop(&mut self) {
    self.close();
  }
}

/// Keeps a [`PostGrid`] in sync with post-state broadcasts for as long as it lives.
pub struct PostGridWatch {
  grid: Arc<Mutex<PostGrid>>,
  sub: Subscription,
}

impl PostGridWatch {
  pub fn start(channel: &ChannelHandle) -> Result<Self> {
    Self::with_grid(channel, Arc::new(Mutex::new(PostGrid::new())))
  }

  pub fn with_grid(channel: &ChannelHandle, grid: Arc<Mutex<PostGrid>>) -> Result<Self> {
    let target = grid.clone();
    let sub = channel.subscribe(Interest::Posts, move |event| {
      let stats = target.lock().apply(event);
      if stats.changed() {
        tracing::trace!(added = stats.added, merged = stats.merged, removed = stats.removed, "post grid updated");
      }
    })?;
    Ok(Self { grid, sub })
  }

  pub fn grid(&self) -> MutexGuard<'_, PostGrid> {
    self.grid.lock()
  }

  pub fn shared_grid(&self) -> Arc<Mutex<PostGrid>> {
    self.grid.clone()
  }

  pub fn close(&self) -> bool {
    self.sub.unsubscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::ConnectionProvider;
  use crate::events::{CommandEnvelope, CommandKind, ThreadParsingBatch};
  use crate::model::{PostState, PostStatus, ThreadParseState, ThreadParseStatus};
  use crate::transport::memory::{MemoryConnector, MemoryPeer};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;
  use tokio::time::timeout;

  const TEST_TIMEOUT: Duration = Duration::from_secs(2);

  async fn connected() -> (ConnectionProvider, ChannelHandle, MemoryPeer) {
    let (connector, mut peers) = MemoryConnector::new();
    let provider = ConnectionProvider::new(connector);
    let channel = provider.get_connection().await.unwrap();
    let peer = peers.recv().await.unwrap();
    (provider, channel, peer)
  }

  fn entry(thread: &str, post: &str) -> ThreadParseEntry {
    ThreadParseEntry {
      thread_id: thread.into(),
      post_id: post.into(),
      title: format!("post {post}"),
      url: format!("https://vipergirls.to/threads/{thread}?p={post}"),
      number: 1,
      image_count: 3,
      previews: vec![],
      hosts: vec![],
    }
  }

  fn parsing(thread: &str, state: ThreadParseStatus, posts: Vec<ThreadParseEntry>) -> ServerEvent {
    ServerEvent::ThreadParsing(ThreadParsingBatch {
      states: vec![ThreadParseState { thread_id: thread.into(), state }],
      posts,
    })
  }

  #[tokio::test]
  async fn end_with_one_row_completes_once_and_unsubscribes() {
    let (_provider, channel, mut peer) = connected().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let watch = ThreadWatch::start(&channel, "T1", AutoPick::SingleRow, move |e| {
      assert_eq!(e.post_id, "p1");
      seen.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    peer.push(&parsing("T1", ThreadParseStatus::Running, vec![entry("T1", "p1")]));
    peer.push(&parsing("T1", ThreadParseStatus::End, vec![]));
    peer.push(&parsing("T1", ThreadParseStatus::End, vec![]));

    let phase = timeout(TEST_TIMEOUT, watch.ended()).await.unwrap();
    assert_eq!(phase, PickerPhase::Ended(Some(ThreadParseStatus::End)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(watch.auto_picked().map(|e| e.post_id), Some("p1".to_string()));
    assert!(!watch.is_subscribed());

    let cmds = peer.drain_commands();
    assert_eq!(
      cmds,
      vec![CommandEnvelope::thread_parsing_sub("T1"), CommandEnvelope::thread_parsing_unsub("T1")]
    );
    drop(watch);
    assert!(peer.drain_commands().is_empty());
  }

  #[tokio::test]
  async fn foreign_thread_batch_leaves_rows_untouched() {
    let (_provider, channel, peer) = connected().await;
    let watch = ThreadWatch::start(&channel, "A", AutoPick::SingleRow, |_| {}).unwrap();

    peer.push(&parsing("A", ThreadParseStatus::Running, vec![entry("A", "1")]));
    peer.push(&parsing("B", ThreadParseStatus::Running, vec![entry("B", "2"), entry("B", "3")]));
    peer.push(&parsing("A", ThreadParseStatus::End, vec![entry("A", "4")]));
    timeout(TEST_TIMEOUT, watch.ended()).await.unwrap();

    let picker = watch.picker();
    assert_eq!(picker.len(), 2);
    assert_eq!(picker.dropped(), 2);
    assert!(picker.rows().iter().all(|r| r.thread_id == "A"));
  }

  #[tokio::test]
  async fn dropping_watch_before_end_sends_one_unsub() {
    let (_provider, channel, mut peer) = connected().await;
    let watch = ThreadWatch::start(&channel, "T9", AutoPick::SingleRow, |_| {}).unwrap();
    for n in 0..10 {
      peer.push(&parsing("T9", ThreadParseStatus::Running, vec![entry("T9", &n.to_string())]));
    }
    timeout(TEST_TIMEOUT, async {
      while watch.picker().len() < 10 {
        tokio::task::yield_now().await;
      }
    })
    .await
    .unwrap();

    watch.close();
    drop(watch);

    let kinds: Vec<CommandKind> = peer.drain_commands().iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec![CommandKind::ThreadParsingSub, CommandKind::ThreadParsingUnsub]);
  }

  #[tokio::test]
  async fn lost_channel_ends_the_watch_and_its_token() {
    let (_provider, channel, mut peer) = connected().await;
    let watch = ThreadWatch::start(&channel, "T3", AutoPick::SingleRow, |_| panic!("no verdict, no auto-pick")).unwrap();
    peer.push(&parsing("T3", ThreadParseStatus::Running, vec![entry("T3", "1")]));
    assert!(watch.is_subscribed());

    peer.disconnect();
    let phase = timeout(TEST_TIMEOUT, watch.ended()).await.unwrap();
    assert_eq!(phase, PickerPhase::Ended(None));
    assert!(!watch.is_subscribed());
    assert!(watch.auto_picked().is_none());
  }

  #[tokio::test]
  async fn start_on_closed_channel_fails() {
    let (provider, channel, _peer) = connected().await;
    provider.teardown().await;
    assert!(ThreadWatch::start(&channel, "T1", AutoPick::SingleRow, |_| {}).is_err());
  }

  #[tokio::test]
  async fn post_grid_watch_follows_broadcasts() {
    let (_provider, channel, peer) = connected().await;
    let watch = PostGridWatch::start(&channel).unwrap();
    let post = PostState {
      post_id: "1".into(),
      thread_id: "t".into(),
      title: "a".into(),
      url: "u".into(),
      status: PostStatus::Downloading,
      progress: 10.0,
      done: 1,
      total: 10,
      hosts: vec![],
      previews: vec![],
    };
    peer.push(&ServerEvent::Posts(vec![post.clone()]));
    peer.push(&ServerEvent::Posts(vec![PostState { status: PostStatus::Complete, progress: 100.0, ..post }]));

    timeout(TEST_TIMEOUT, async {
      loop {
        if watch.grid().get("1").is_some_and(|p| p.status == PostStatus::Complete) {
          break;
        }
        tokio::task::yield_now().await;
      }
    })
    .await
    .unwrap();
    assert_eq!(watch.grid().len(), 1);

    assert!(watch.close());
    peer.push(&ServerEvent::PostsRemoved(vec!["1".into()]));
    tokio::task::yield_now().await;
    assert_eq!(watch.grid().len(), 1);
  }
}

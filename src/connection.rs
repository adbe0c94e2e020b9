//! Shared, lazily established socket channel.

use crate::dispatch::CommandDispatcher;
use crate::error::Result;
use crate::events::{CommandEnvelope, Interest, ServerEvent};
use crate::registry::{Subscription, SubscriptionRegistry, SubscriptionStream};
use crate::transport::{Connector, Link};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Hands every caller the same channel until teardown. A failed attempt is
/// returned as an error and the next call tries again; a channel whose
/// transport died is replaced on the next call.
pub struct ConnectionProvider {
  connector: Arc<dyn Connector>,
  slot: tokio::sync::Mutex<Option<ChannelHandle>>,
}

impl ConnectionProvider {
  pub fn new(connector: impl Connector) -> Self {
    Self::from_arc(Arc::new(connector))
  }

  pub fn from_arc(connector: Arc<dyn Connector>) -> Self {
    Self {
      connector,
      slot: tokio::sync::Mutex::new(None),
    }
  }

  pub async fn get_connection(&self) -> Result<ChannelHandle> {
    // Holding the slot across the connect makes concurrent callers wait for
    // the in-flight attempt instead of opening their own.
    let mut slot = self.slot.lock().await;
    if let Some(handle) = slot.as_ref() {
      if handle.is_open() {
        return Ok(handle.clone());
      }
      tracing::info!(url = %self.connector.endpoint(), "channel lost, reconnecting");
      handle.close();
    }

    let link = self.connector.connect().await.map_err(|e| {
      tracing::warn!(url = %self.connector.endpoint(), error = %e, "failed to open channel");
      e
    })?;
    let handle = ChannelHandle::open(link);
    *slot = Some(handle.clone());
    Ok(handle)
  }

  /// Returns the current channel without connecting.
  pub async fn current(&self) -> Option<ChannelHandle> {
    self.slot.lock().await.clone()
  }

  pub async fn teardown(&self) {
    if let Some(handle) = self.slot.lock().await.take() {
      handle.close();
      tracing::info!(url = %self.connector.endpoint(), "channel torn down");
    }
  }
}

/// Cheap to clone; all clones share one registry and one write side.
#[derive(Clone)]
pub struct ChannelHandle {
  inner: Arc<ChannelInner>,
}

struct ChannelInner {
  registry: SubscriptionRegistry,
  reader: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelHandle {
  /// Wraps an established link and starts delivering its inbound frames.
  /// Must be called inside a Tokio runtime.
  pub fn open(link: Link) -> Self {
    let Link { outbound, inbound } = link;
    let registry = SubscriptionRegistry::new(CommandDispatcher::new(outbound));
    let reader = tokio::spawn(run_delivery(inbound, registry.clone()));
    Self {
      inner: Arc::new(ChannelInner {
        registry,
        reader: Mutex::new(Some(reader)),
      }),
    }
  }

  pub fn registry(&self) -> &SubscriptionRegistry {
    &self.inner.registry
  }

  pub fn send(&self, envelope: &CommandEnvelope) -> Result<()> {
    self.inner.registry.send(envelope)
  }

  pub fn subscribe<F>(&self, interest: Interest, callback: F) -> Result<Subscription>
  where
    F: Fn(&ServerEvent) + Send + Sync + 'static,
  {
    self.inner.registry.subscribe(interest, callback)
  }

  pub fn subscribe_stream(&self, interest: Interest) -> Result<SubscriptionStream> {
    self.inner.registry.subscribe_stream(interest)
  }

  pub fn is_open(&self) -> bool {
    self.inner.registry.is_open()
  }

  pub fn close(&self) {
    self.inner.registry.close();
    if let Some(reader) = self.inner.reader.lock().take() {
      reader.abort();
    }
  }
}

/// Single delivery loop per channel: frames are decoded and fanned out one at
/// a time, in arrival order.
async fn run_delivery(mut inbound: mpsc::UnboundedReceiver<String>, registry: SubscriptionRegistry) {
  while let Some(frame) = inbound.recv().await {
    if let Some(event) = ServerEvent::decode(&frame) {
      registry.dispatch(&event);
    }
  }
  tracing::info!("socket channel closed by server");
  registry.close();
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ClientError;
  use crate::events::Topic;
  use crate::transport::memory::MemoryConnector;
  use futures_util::StreamExt;
  use std::time::Duration;
  use tokio::time::timeout;

  const TEST_TIMEOUT: Duration = Duration::from_secs(2);

  #[tokio::test]
  async fn concurrent_callers_share_one_in_flight_connection() {
    let (connector, mut peers) = MemoryConnector::new();
    let provider = Arc::new(ConnectionProvider::new(connector.with_delay(Duration::from_millis(50))));

    let a = tokio::spawn({
      let p = provider.clone();
      async move { p.get_connection().await }
    });
    let b = tokio::spawn({
      let p = provider.clone();
      async move { p.get_connection().await }
    });
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&a.inner, &b.inner));
    assert!(peers.try_recv().is_ok());
    assert!(peers.try_recv().is_err());
  }

  #[tokio::test]
  async fn failed_connect_is_reported_and_retried_on_next_call() {
    let (connector, _peers) = MemoryConnector::new();
    connector.fail_next(1);
    let provider = ConnectionProvider::new(connector);

    let err = provider.get_connection().await.err().expect("first attempt should fail");
    assert!(matches!(err, ClientError::Connect { .. }));
    assert!(provider.get_connection().await.is_ok());
  }

  #[tokio::test]
  async fn server_disconnect_closes_channel_and_next_call_reconnects() {
    let (connector, mut peers) = MemoryConnector::new();
    let provider = ConnectionProvider::new(connector);
    let first = provider.get_connection().await.unwrap();
    let mut peer = peers.recv().await.unwrap();
    let sub = first.subscribe(Interest::Posts, |_| {}).unwrap();

    peer.disconnect();
    timeout(TEST_TIMEOUT, async {
      while first.is_open() {
        tokio::task::yield_now().await;
      }
    })
    .await
    .expect("channel should close after server disconnect");

    let err = first.send(&CommandEnvelope::thread_parsing_sub("1")).unwrap_err();
    assert!(matches!(err, ClientError::ChannelClosed));
    assert!(!sub.is_active());

    let second = provider.get_connection().await.unwrap();
    assert!(second.is_open());
    assert!(!Arc::ptr_eq(&first.inner, &second.inner));
  }

  #[tokio::test]
  async fn frames_reach_subscribers_in_arrival_order() {
    let (connector, mut peers) = MemoryConnector::new();
    let provider = ConnectionProvider::new(connector);
    let channel = provider.get_connection().await.unwrap();
    let peer = peers.recv().await.unwrap();

    let mut stream = channel.subscribe_stream(Interest::Posts).unwrap();
    for n in 0..20 {
      peer.push(&ServerEvent::PostsRemoved(vec![n.to_string()]));
    }

    for n in 0..20 {
      let evt = timeout(TEST_TIMEOUT, stream.next()).await.unwrap().unwrap();
      assert_eq!(evt, ServerEvent::PostsRemoved(vec![n.to_string()]));
    }
  }

  #[tokio::test]
  async fn teardown_then_release_is_quiet() {
    let (connector, mut peers) = MemoryConnector::new();
    let provider = ConnectionProvider::new(connector);
    let channel = provider.get_connection().await.unwrap();
    let mut peer = peers.recv().await.unwrap();
    let sub = channel.subscribe(Interest::thread("1"), |_| {}).unwrap();

    provider.teardown().await;
    provider.teardown().await;
    assert!(sub.unsubscribe());
    assert!(!sub.unsubscribe());
    assert_eq!(channel.registry().subscriber_count(Topic::ThreadParsing), 0);
    assert_eq!(peer.drain_commands(), vec![CommandEnvelope::thread_parsing_sub("1")]);
    assert!(provider.current().await.is_none());
  }
}

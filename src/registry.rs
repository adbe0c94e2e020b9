//! Per-topic fan-out of inbound events to registered callbacks.

use crate::dispatch::CommandDispatcher;
use crate::error::{ClientError, Result};
use crate::events::{CommandEnvelope, Interest, ServerEvent, Topic};
use dashmap::DashMap;
use futures_util::Stream;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Callback = Box<dyn Fn(&ServerEvent) + Send + Sync>;
type CloseHook = Box<dyn Fn() + Send + Sync>;

struct Subscriber {
  id: u64,
  // Held for the whole delivery. Release takes it as well, so once it returns
  // no delivery to this subscriber is running. Reentrant so a callback can
  // release its own token.
  active: ReentrantMutex<Cell<bool>>,
  // Mirrors `active` for readers that must not wait on a running delivery.
  live: AtomicBool,
  callback: Callback,
  on_close: Option<CloseHook>,
}

impl Subscriber {
  fn deliver(&self, event: &ServerEvent) {
    let active = self.active.lock();
    if active.get() {
      (self.callback)(event);
    }
  }

  fn is_active(&self) -> bool {
    self.live.load(Ordering::Acquire)
  }

  fn deactivate(&self) {
    let active = self.active.lock();
    if active.replace(false) {
      self.live.store(false, Ordering::Release);
      if let Some(hook) = &self.on_close {
        hook();
      }
    }
  }
}

struct RegistryShared {
  dispatcher: CommandDispatcher,
  topics: DashMap<Topic, Vec<Arc<Subscriber>>>,
  // Live tokens per scoped thread. UNSUB goes out when the last one is released.
  scopes: Mutex<HashMap<String, usize>>,
  closed: AtomicBool,
  next_id: AtomicU64,
}

impl RegistryShared {
  fn remove(&self, topic: Topic, id: u64) {
    if let Some(mut subs) = self.topics.get_mut(&topic) {
      subs.retain(|s| s.id != id);
    }
  }

  /// Every scoped token sends its own SUB so the server replays state to it.
  fn acquire_scope(&self, interest: &Interest) -> Result<()> {
    let (Some(thread_id), Some(cmd)) = (interest.thread_id(), interest.sub_command()) else {
      return Ok(());
    };
    let mut scopes = self.scopes.lock();
    self.dispatcher.send(&cmd)?;
    *scopes.entry(thread_id.to_string()).or_insert(0) += 1;
    Ok(())
  }

  fn release_scope(&self, interest: &Interest, subscription_id: u64) {
    let (Some(thread_id), Some(cmd)) = (interest.thread_id(), interest.unsub_command()) else {
      return;
    };
    let mut scopes = self.scopes.lock();
    let Some(live) = scopes.get_mut(thread_id) else {
      return;
    };
    *live -= 1;
    if *live > 0 {
      tracing::debug!(thread_id, remaining = *live, "thread still watched, unsubscribe deferred");
      return;
    }
    scopes.remove(thread_id);
    if let Err(e) = self.dispatcher.send(&cmd) {
      tracing::debug!(subscription_id, error = %e, "unsubscribe command not sent");
    }
  }
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
  shared: Arc<RegistryShared>,
}

impl SubscriptionRegistry {
  pub fn new(dispatcher: CommandDispatcher) -> Self {
    Self {
      shared: Arc::new(RegistryShared {
        dispatcher,
        topics: DashMap::new(),
        scopes: Mutex::new(HashMap::new()),
        closed: AtomicBool::new(false),
        next_id: AtomicU64::new(1),
      }),
    }
  }

  /// Registers `callback` for the interest's topic. Scoped interests also
  /// announce themselves to the server; if that write fails nothing stays
  /// registered.
  pub fn subscribe<F>(&self, interest: Interest, callback: F) -> Result<Subscription>
  where
    F: Fn(&ServerEvent) + Send + Sync + 'static,
  {
    self.register(interest, Box::new(callback), None)
  }

  /// `on_close` runs once, when the token is released or the channel closes.
  pub(crate) fn subscribe_with_close<F, C>(&self, interest: Interest, callback: F, on_close: C) -> Result<Subscription>
  where
    F: Fn(&ServerEvent) + Send + Sync + 'static,
    C: Fn() + Send + Sync + 'static,
  {
    self.register(interest, Box::new(callback), Some(Box::new(on_close)))
  }

  /// Same as [`subscribe`](Self::subscribe) but yields events as a stream.
  /// The stream ends when the token is released or the channel closes.
  pub fn subscribe_stream(&self, interest: Interest) -> Result<SubscriptionStream> {
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
    let sender = Arc::new(Mutex::new(Some(tx)));
    let closer = sender.clone();
    let subscription = self.register(
      interest,
      Box::new(move |event: &ServerEvent| {
        if let Some(tx) = sender.lock().as_ref() {
          let _ = tx.send(event.clone());
        }
      }),
      Some(Box::new(move || {
        closer.lock().take();
      })),
    )?;
    Ok(SubscriptionStream {
      events: UnboundedReceiverStream::new(rx),
      subscription,
    })
  }

  fn register(&self, interest: Interest, callback: Callback, on_close: Option<CloseHook>) -> Result<Subscription> {
    if !self.is_open() {
      return Err(ClientError::ChannelClosed);
    }
    let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
    let topic = interest.topic();
    let subscriber = Arc::new(Subscriber {
      id,
      active: ReentrantMutex::new(Cell::new(true)),
      live: AtomicBool::new(true),
      callback,
      on_close,
    });
    self.shared.topics.entry(topic).or_default().push(subscriber.clone());

    // close() may have drained the topics between the check above and the push.
    if self.shared.closed.load(Ordering::SeqCst) {
      subscriber.deactivate();
      self.shared.remove(topic, id);
      return Err(ClientError::ChannelClosed);
    }

    if let Err(e) = self.shared.acquire_scope(&interest) {
      subscriber.deactivate();
      self.shared.remove(topic, id);
      tracing::warn!(topic = topic.name(), error = %e, "subscribe command failed");
      return Err(e);
    }

    tracing::debug!(topic = topic.name(), subscription_id = id, "subscribed");
    Ok(Subscription {
      id,
      interest,
      subscriber,
      registry: Arc::downgrade(&self.shared),
      released: AtomicBool::new(false),
    })
  }

  /// Idempotent; see [`Subscription::unsubscribe`].
  pub fn unsubscribe(&self, token: &Subscription) -> bool {
    token.unsubscribe()
  }

  pub fn send(&self, envelope: &CommandEnvelope) -> Result<()> {
    self.shared.dispatcher.send(envelope)
  }

  /// Delivers one event to every live subscriber of its topic, in
  /// registration order.
  pub fn dispatch(&self, event: &ServerEvent) {
    let subscribers = match self.shared.topics.get(&event.topic()) {
      Some(subs) => subs.value().clone(),
      None => return,
    };
    for subscriber in &subscribers {
      subscriber.deliver(event);
    }
  }

  pub fn subscriber_count(&self, topic: Topic) -> usize {
    self.shared.topics.get(&topic).map(|s| s.len()).unwrap_or(0)
  }

  pub fn is_open(&self) -> bool {
    !self.shared.closed.load(Ordering::SeqCst) && self.shared.dispatcher.is_open()
  }

  /// Closes the write side and drops every registration. Outstanding tokens
  /// stay valid to release but report inactive.
  pub fn close(&self) {
    self.shared.closed.store(true, Ordering::SeqCst);
    self.shared.dispatcher.close();
    self.shared.scopes.lock().clear();
    let topics: Vec<Topic> = self.shared.topics.iter().map(|e| *e.key()).collect();
    for topic in topics {
      if let Some((_, subs)) = self.shared.topics.remove(&topic) {
        for subscriber in subs {
          subscriber.deactivate();
        }
      }
    }
  }
}

/// A registered callback. Released explicitly with [`unsubscribe`](Self::unsubscribe)
/// or when dropped.
pub struct Subscription {
  id: u64,
  interest: Interest,
  subscriber: Arc<Subscriber>,
  registry: Weak<RegistryShared>,
  released: AtomicBool,
}

impl Subscription {
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn interest(&self) -> &Interest {
    &self.interest
  }

  /// False once released, and once the channel it was registered on closed.
  pub fn is_active(&self) -> bool {
    !self.released.load(Ordering::Acquire) && self.subscriber.is_active()
  }

  /// Returns true for the call that actually released the token. Later calls,
  /// and calls after the channel is gone, do nothing.
  pub fn unsubscribe(&self) -> bool {
    if self.released.swap(true, Ordering::AcqRel) {
      return false;
    }
    self.subscriber.deactivate();

    let Some(shared) = self.registry.upgrade() else {
      return true;
    };
    shared.remove(self.interest.topic(), self.id);
    shared.release_scope(&self.interest, self.id);
    tracing::debug!(topic = self.interest.topic().name(), subscription_id = self.id, "unsubscribed");
    true
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

pub struct SubscriptionStream {
  events: UnboundedReceiverStream<ServerEvent>,
  subscription: Subscription,
}

impl SubscriptionStream {
  pub fn subscription(&self) -> &Subscription {
    &self.subscription
  }
}

impl Stream for SubscriptionStream {
  type Item = ServerEvent;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    Pin::new(&mut self.events).poll_next(cx)
  }
}

//! In-process connector. Each successful connect hands the server end of the
//! channel to whoever holds the peer receiver.

use super::{Connector, Link};
use crate::error::{ClientError, Result};
use crate::events::{CommandEnvelope, ServerEvent};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct MemoryConnector {
  peers: mpsc::UnboundedSender<MemoryPeer>,
  failures: AtomicUsize,
  attempts: AtomicUsize,
  delay: Option<Duration>,
}

impl MemoryConnector {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
    let (peers, rx) = mpsc::unbounded_channel();
    let connector = Self {
      peers,
      failures: AtomicUsize::new(0),
      attempts: AtomicUsize::new(0),
      delay: None,
    };
    (connector, rx)
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Makes the next `n` connection attempts fail.
  pub fn fail_next(&self, n: usize) {
    self.failures.store(n, Ordering::SeqCst);
  }

  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }
}

impl Connector for MemoryConnector {
  fn endpoint(&self) -> String {
    "memory://local".to_string()
  }

  fn connect(&self) -> BoxFuture<'_, Result<Link>> {
    Box::pin(async move {
      self.attempts.fetch_add(1, Ordering::SeqCst);
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }
      let refused = self
        .failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
      if refused {
        return Err(ClientError::Connect { url: self.endpoint(), reason: "connection refused".into() });
      }

      let (out_tx, out_rx) = mpsc::unbounded_channel();
      let (in_tx, in_rx) = mpsc::unbounded_channel();
      let peer = MemoryPeer { to_client: Some(in_tx), from_client: out_rx };
      if self.peers.send(peer).is_err() {
        return Err(ClientError::Connect { url: self.endpoint(), reason: "no peer listening".into() });
      }
      Ok(Link { outbound: out_tx, inbound: in_rx })
    })
  }
}

/// Server end of an in-process channel.
pub struct MemoryPeer {
  to_client: Option<mpsc::UnboundedSender<String>>,
  from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
  pub fn push(&self, event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
      Ok(frame) => self.push_raw(frame),
      Err(_) => false,
    }
  }

  pub fn push_raw(&self, frame: impl Into<String>) -> bool {
    match &self.to_client {
      Some(tx) => tx.send(frame.into()).is_ok(),
      None => false,
    }
  }

  pub async fn next_command(&mut self) -> Option<CommandEnvelope> {
    let frame = self.from_client.recv().await?;
    serde_json::from_str(&frame).ok()
  }

  pub fn try_next_command(&mut self) -> Option<CommandEnvelope> {
    let frame = self.from_client.try_recv().ok()?;
    serde_json::from_str(&frame).ok()
  }

  pub fn drain_commands(&mut self) -> Vec<CommandEnvelope> {
    let mut out = Vec::new();
    while let Some(cmd) = self.try_next_command() {
      out.push(cmd);
    }
    out
  }

  /// Simulates the server dropping the connection.
  pub fn disconnect(&mut self) {
    self.to_client = None;
  }
}

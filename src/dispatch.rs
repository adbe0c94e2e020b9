use crate::error::{ClientError, Result};
use crate::events::CommandEnvelope;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Writes command envelopes to the shared channel. No queueing, retry or
/// acknowledgement; a write to a closed channel is reported to the caller.
#[derive(Clone)]
pub struct CommandDispatcher {
  outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl CommandDispatcher {
  pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
    Self { outbound: Arc::new(Mutex::new(Some(outbound))) }
  }

  pub fn send(&self, envelope: &CommandEnvelope) -> Result<()> {
    let frame = envelope.to_frame()?;
    let guard = self.outbound.lock();
    let Some(tx) = guard.as_ref() else {
      return Err(ClientError::ChannelClosed);
    };
    tx.send(frame).map_err(|_| ClientError::ChannelClosed)?;
    tracing::trace!(cmd = ?envelope.kind(), "command sent");
    Ok(())
  }

  pub fn is_open(&self) -> bool {
    self.outbound.lock().as_ref().is_some_and(|tx| !tx.is_closed())
  }

  /// Returns false if the dispatcher was already closed.
  pub fn close(&self) -> bool {
    self.outbound.lock().take().is_some()
  }
}

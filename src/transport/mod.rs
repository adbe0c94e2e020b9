//! Transport layer: opens the socket channel and exposes it as a pair of frame queues.

#[cfg(test)]
pub mod memory;

use crate::error::{ClientError, Result};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

/// An established channel. Dropping `outbound` closes the write side; `inbound`
/// ends when the server side goes away.
pub struct Link {
  pub outbound: mpsc::UnboundedSender<String>,
  pub inbound: mpsc::UnboundedReceiver<String>,
}

pub trait Connector: Send + Sync + 'static {
  fn endpoint(&self) -> String;

  fn connect(&self) -> BoxFuture<'_, Result<Link>>;
}

#[derive(Debug, Clone)]
pub struct WsConnector {
  url: Url,
  connect_timeout: Duration,
}

impl WsConnector {
  pub fn new(url: Url, connect_timeout: Duration) -> Self {
    Self { url, connect_timeout }
  }
}

impl Connector for WsConnector {
  fn endpoint(&self) -> String {
    self.url.to_string()
  }

  fn connect(&self) -> BoxFuture<'_, Result<Link>> {
    Box::pin(async move {
      let endpoint = self.endpoint();
      let attempt = tokio_tungstenite::connect_async(self.url.as_str());
      let (ws, _response) = match tokio::time::timeout(self.connect_timeout, attempt).await {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
          return Err(ClientError::Connect { url: endpoint, reason: e.to_string() });
        }
        Err(_) => {
          return Err(ClientError::Connect {
            url: endpoint,
            reason: format!("timed out after {:?}", self.connect_timeout),
          });
        }
      };
      tracing::info!(url = %endpoint, "socket channel established");
      Ok(spawn_pumps(ws))
    })
  }
}

fn spawn_pumps<S>(ws: WebSocketStream<S>) -> Link
where
  S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  let (mut sink, mut stream) = ws.split();
  let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
  let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
  let (closed_tx, mut closed_rx) = oneshot::channel::<()>();

  tokio::spawn(async move {
    while let Some(msg) = stream.next().await {
      match msg {
        Ok(Message::Text(text)) => {
          if in_tx.send(text).is_err() {
            break;
          }
        }
        Ok(Message::Close(frame)) => {
          tracing::info!(?frame, "server closed socket channel");
          break;
        }
        // Pings are answered by tungstenite itself.
        Ok(_) => {}
        Err(e) => {
          tracing::warn!(error = %e, "socket read failed");
          break;
        }
      }
    }
    let _ = closed_tx.send(());
  });

  tokio::spawn(async move {
    loop {
      tokio::select! {
        frame = out_rx.recv() => {
          let Some(frame) = frame else { break };
          if let Err(e) = sink.send(Message::Text(frame)).await {
            tracing::warn!(error = %e, "socket write failed");
            break;
          }
        }
        _ = &mut closed_rx => break,
      }
    }
    // Dropping out_rx here makes later sends report a closed channel.
    let _ = sink.close().await;
  });

  Link { outbound: out_tx, inbound: in_rx }
}

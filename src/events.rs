//! Wire protocol spoken over the socket channel.

use crate::error::Result;
use crate::model::{PostState, ThreadParseEntry, ThreadParseState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
  ThreadParsingSub,
  ThreadParsingUnsub,
}

/// A command sent to the server. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
  #[serde(rename = "cmd")]
  kind: CommandKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  payload: Option<serde_json::Value>,
}

impl CommandEnvelope {
  pub fn new(kind: CommandKind) -> Self {
    Self { kind, payload: None }
  }

  pub fn with_payload<T: Serialize>(kind: CommandKind, payload: &T) -> Result<Self> {
    Ok(Self {
      kind,
      payload: Some(serde_json::to_value(payload)?),
    })
  }

  pub fn thread_parsing_sub(thread_id: &str) -> Self {
    Self {
      kind: CommandKind::ThreadParsingSub,
      payload: Some(serde_json::Value::String(thread_id.to_string())),
    }
  }

  pub fn thread_parsing_unsub(thread_id: &str) -> Self {
    Self {
      kind: CommandKind::ThreadParsingUnsub,
      payload: Some(serde_json::Value::String(thread_id.to_string())),
    }
  }

  pub fn kind(&self) -> CommandKind {
    self.kind
  }

  pub fn payload(&self) -> Option<&serde_json::Value> {
    self.payload.as_ref()
  }

  pub fn to_frame(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
  ThreadParsing,
  Posts,
}

impl Topic {
  pub fn name(&self) -> &'static str {
    match self {
      Topic::ThreadParsing => "thread-parsing",
      Topic::Posts => "posts",
    }
  }
}

/// What a subscriber wants to receive. Scoped interests are announced to the
/// server with a SUB command and withdrawn with the matching UNSUB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
  Posts,
  ThreadParsing { thread_id: String },
}

impl Interest {
  pub fn thread(thread_id: impl Into<String>) -> Self {
    Interest::ThreadParsing { thread_id: thread_id.into() }
  }

  /// The thread a scoped interest is narrowed to.
  pub fn thread_id(&self) -> Option<&str> {
    match self {
      Interest::Posts => None,
      Interest::ThreadParsing { thread_id } => Some(thread_id),
    }
  }

  pub fn topic(&self) -> Topic {
    match self {
      Interest::Posts => Topic::Posts,
      Interest::ThreadParsing { .. } => Topic::ThreadParsing,
    }
  }

  pub fn sub_command(&self) -> Option<CommandEnvelope> {
    match self {
      Interest::Posts => None,
      Interest::ThreadParsing { thread_id } => Some(CommandEnvelope::thread_parsing_sub(thread_id)),
    }
  }

  pub fn unsub_command(&self) -> Option<CommandEnvelope> {
    match self {
      Interest::Posts => None,
      Interest::ThreadParsing { thread_id } => Some(CommandEnvelope::thread_parsing_unsub(thread_id)),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadParsingBatch {
  #[serde(default)]
  pub states: Vec<ThreadParseState>,
  #[serde(default)]
  pub posts: Vec<ThreadParseEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
  ThreadParsing(ThreadParsingBatch),
  Posts(Vec<PostState>),
  PostsRemoved(Vec<String>),
}

impl ServerEvent {
  pub fn topic(&self) -> Topic {
    match self {
      ServerEvent::ThreadParsing(_) => Topic::ThreadParsing,
      ServerEvent::Posts(_) | ServerEvent::PostsRemoved(_) => Topic::Posts,
    }
  }

  /// Frames that are not valid events are logged and skipped.
  pub fn decode(frame: &str) -> Option<Self> {
    match serde_json::from_str(frame) {
      Ok(evt) => Some(evt),
      Err(e) => {
        tracing::warn!(error = %e, frame_len = frame.len(), "dropping undecodable server frame");
        None
      }
    }
  }
}

//! Rows discovered while the server parses one thread, plus the user's
//! selection over them.

use super::{ApplyStats, Row, RowSet};
use crate::events::ThreadParsingBatch;
use crate::model::{PostToAdd, ThreadParseEntry, ThreadParseStatus};
use std::collections::HashSet;

impl Row for ThreadParseEntry {
  type Key = String;

  fn key(&self) -> String {
    self.url.clone()
  }
}

/// What happens when parsing ends and exactly one row is visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPick {
  #[default]
  SingleRow,
  Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerPhase {
  Idle,
  Subscribed,
  /// Terminal. Carries the server's final state, or `None` when the owner
  /// went away first.
  Ended(Option<ThreadParseStatus>),
}

impl PickerPhase {
  pub fn is_ended(&self) -> bool {
    matches!(self, PickerPhase::Ended(_))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerUpdate {
  /// Not subscribed (yet, or any more); nothing was applied.
  Ignored,
  Applied(ApplyStats),
  Ended {
    stats: ApplyStats,
    status: ThreadParseStatus,
    auto_pick: Option<ThreadParseEntry>,
  },
}

#[derive(Debug, Clone)]
pub struct ThreadPicker {
  thread_id: String,
  phase: PickerPhase,
  auto_pick: AutoPick,
  rows: RowSet<ThreadParseEntry>,
  selected: HashSet<String>,
  quick_filter: Option<String>,
  dropped: usize,
}

impl ThreadPicker {
  pub fn new(thread_id: impl Into<String>, auto_pick: AutoPick) -> Self {
    Self {
      thread_id: thread_id.into(),
      phase: PickerPhase::Idle,
      auto_pick,
      rows: RowSet::new(),
      selected: HashSet::new(),
      quick_filter: None,
      dropped: 0,
    }
  }

  pub fn thread_id(&self) -> &str {
    &self.thread_id
  }

  pub fn phase(&self) -> PickerPhase {
    self.phase
  }

  pub fn loading(&self) -> bool {
    !self.phase.is_ended()
  }

  /// Rows that were rejected because they belong to another thread.
  pub fn dropped(&self) -> usize {
    self.dropped
  }

  pub fn mark_subscribed(&mut self) {
    if self.phase == PickerPhase::Idle {
      self.phase = PickerPhase::Subscribed;
    }
  }

  /// Ends the picker without a server verdict. No auto-pick happens.
  pub fn finish(&mut self) {
    if !self.phase.is_ended() {
      self.phase = PickerPhase::Ended(None);
    }
  }

  /// Applies one thread-parsing batch. Entries for other threads are
  /// dropped; a terminal state for this thread closes the picker after the
  /// batch's entries are in.
  pub fn apply(&mut self, batch: &ThreadParsingBatch) -> PickerUpdate {
    if self.phase != PickerPhase::Subscribed {
      return PickerUpdate::Ignored;
    }

    let mut stats = ApplyStats::default();
    for entry in &batch.posts {
      if entry.thread_id != self.thread_id {
        stats.dropped += 1;
        continue;
      }
      match self.rows.upsert(entry.clone()) {
        super::Upsert::Added => stats.added += 1,
        super::Upsert::Merged => stats.merged += 1,
      }
    }
    if stats.dropped > 0 {
      self.dropped += stats.dropped;
      tracing::debug!(thread_id = %self.thread_id, dropped = stats.dropped, "ignored rows for another thread");
    }

    let terminal = batch
      .states
      .iter()
      .rev()
      .find(|s| s.thread_id == self.thread_id)
      .map(|s| s.state)
      .filter(|s| s.is_terminal());
    let Some(status) = terminal else {
      return PickerUpdate::Applied(stats);
    };

    self.phase = PickerPhase::Ended(Some(status));
    let auto_pick = match (status, self.auto_pick) {
      (ThreadParseStatus::End, AutoPick::SingleRow) => self.single_visible_row().cloned(),
      _ => None,
    };
    tracing::info!(
      thread_id = %self.thread_id,
      ?status,
      rows = self.rows.len(),
      auto_pick = auto_pick.is_some(),
      "thread parsing finished"
    );
    PickerUpdate::Ended { stats, status, auto_pick }
  }

  pub fn rows(&self) -> &[ThreadParseEntry] {
    self.rows.rows()
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// Case-insensitive match on number, title and url. `None` or blank shows all rows.
  pub fn set_quick_filter(&mut self, filter: Option<&str>) {
    self.quick_filter = filter
      .map(|f| f.trim().to_lowercase())
      .filter(|f| !f.is_empty());
  }

  pub fn visible(&self) -> impl Iterator<Item = &ThreadParseEntry> {
    self.rows.iter().filter(move |row| self.matches_filter(row))
  }

  pub fn visible_count(&self) -> usize {
    self.visible().count()
  }

  fn single_visible_row(&self) -> Option<&ThreadParseEntry> {
    let mut visible = self.visible();
    let first = visible.next()?;
    visible.next().is_none().then_some(first)
  }

  fn matches_filter(&self, row: &ThreadParseEntry) -> bool {
    let Some(filter) = &self.quick_filter else {
      return true;
    };
    row.number.to_string().contains(filter.as_str())
      || row.title.to_lowercase().contains(filter.as_str())
      || row.url.to_lowercase().contains(filter.as_str())
  }

  /// Returns false when no row has that url.
  pub fn select(&mut self, url: &str) -> bool {
    if !self.rows.contains(&url.to_string()) {
      return false;
    }
    self.selected.insert(url.to_string());
    true
  }

  pub fn deselect(&mut self, url: &str) -> bool {
    self.selected.remove(url)
  }

  /// Selects every row, filtered out or not.
  pub fn select_all(&mut self) {
    self.selected = self.rows.iter().map(|r| r.url.clone()).collect();
  }

  pub fn clear_selection(&mut self) {
    self.selected.clear();
  }

  pub fn is_selected(&self, url: &str) -> bool {
    self.selected.contains(url)
  }

  pub fn selected_rows(&self) -> impl Iterator<Item = &ThreadParseEntry> {
    self.rows.iter().filter(move |r| self.selected.contains(&r.url))
  }

  /// Selected rows as posts to queue, always scoped to this picker's thread.
  pub fn submission(&self) -> Vec<PostToAdd> {
    self
      .selected_rows()
      .map(|r| PostToAdd {
        post_id: r.post_id.clone(),
        thread_id: self.thread_id.clone(),
      })
      .collect()
  }
}

//! Keyed row collections that absorb partial updates without full replacement.

pub mod post_grid;
pub mod thread_picker;

use std::collections::HashMap;
use std::hash::Hash;

pub trait Row: Clone {
  type Key: Eq + Hash + Clone;

  fn key(&self) -> Self::Key;

  /// Field-level overwrite of an existing row with a newer record for the same key.
  fn merge(&mut self, update: Self) {
    *self = update;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
  Added,
  Merged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
  pub added: usize,
  pub merged: usize,
  pub removed: usize,
  pub dropped: usize,
}

impl ApplyStats {
  pub fn changed(&self) -> bool {
    self.added + self.merged + self.removed > 0
  }
}

/// Rows in insertion order plus a key index. Existing rows keep their
/// position when merged.
#[derive(Debug, Clone)]
pub struct RowSet<R: Row> {
  rows: Vec<R>,
  index: HashMap<R::Key, usize>,
}

impl<R: Row> Default for RowSet<R> {
  fn default() -> Self {
    Self { rows: Vec::new(), index: HashMap::new() }
  }
}

impl<R: Row> RowSet<R> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn rows(&self) -> &[R] {
    &self.rows
  }

  pub fn iter(&self) -> std::slice::Iter<'_, R> {
    self.rows.iter()
  }

  pub fn get(&self, key: &R::Key) -> Option<&R> {
    self.index.get(key).map(|&i| &self.rows[i])
  }

  pub fn contains(&self, key: &R::Key) -> bool {
    self.index.contains_key(key)
  }

  pub fn upsert(&mut self, row: R) -> Upsert {
    let key = row.key();
    if let Some(&i) = self.index.get(&key) {
      self.rows[i].merge(row);
      return Upsert::Merged;
    }
    self.index.insert(key, self.rows.len());
    self.rows.push(row);
    Upsert::Added
  }

  pub fn apply<I>(&mut self, batch: I) -> ApplyStats
  where
    I: IntoIterator<Item = R>,
  {
    let mut stats = ApplyStats::default();
    for row in batch {
      match self.upsert(row) {
        Upsert::Added => stats.added += 1,
        Upsert::Merged => stats.merged += 1,
      }
    }
    stats
  }

  /// Removing shifts later rows up by one; their relative order is kept.
  pub fn remove(&mut self, key: &R::Key) -> Option<R> {
    let i = self.index.remove(key)?;
    let removed = self.rows.remove(i);
    for row in &self.rows[i..] {
      if let Some(pos) = self.index.get_mut(&row.key()) {
        *pos -= 1;
      }
    }
    Some(removed)
  }

  pub fn clear(&mut self) {
    self.rows.clear();
    self.index.clear();
  }
}

//! Expiring cache entries and the per-metric entry sequence.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A cached value with its creation and expiry times.
///
/// Entries are never mutated after creation; a new fetch produces a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub value: T,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  pub fn new(value: T, created_at: DateTime<Utc>, lifetime: Duration) -> Self {
    Self {
      value,
      created_at,
      expires_at: created_at + lifetime,
    }
  }

  /// Expired strictly after `expires_at`.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now > self.expires_at
  }
}

/// Ordered entries for one metric type, oldest first.
///
/// Eviction is expiry first, then oldest-first truncation. Reads never
/// reorder entries, so this is FIFO rather than LRU.
#[derive(Debug, Clone)]
pub struct MetricCache<T> {
  entries: VecDeque<CacheEntry<T>>,
}

impl<T> MetricCache<T> {
  pub fn new() -> Self {
    Self {
      entries: VecDeque::new(),
    }
  }

  pub fn from_entries(entries: impl IntoIterator<Item = CacheEntry<T>>) -> Self {
    Self {
      entries: entries.into_iter().collect(),
    }
  }

  pub fn push(&mut self, entry: CacheEntry<T>) {
    self.entries.push_back(entry);
  }

  /// The most recently appended entry, if it has not expired.
  pub fn latest(&self, now: DateTime<Utc>) -> Option<&CacheEntry<T>> {
    self.entries.back().filter(|entry| !entry.is_expired(now))
  }

  /// Drop expired entries, then the oldest until at most `max_size` remain.
  pub fn trim(&mut self, now: DateTime<Utc>, max_size: usize) {
    self.entries.retain(|entry| !entry.is_expired(now));
    while self.entries.len() > max_size {
      self.entries.pop_front();
    }
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(&self) -> impl Iterator<Item = &CacheEntry<T>> {
    self.entries.iter()
  }
}

impl<T> Default for MetricCache<T> {
  fn default() -> Self {
    Self::new()
  }
}

//! Result types for cache-aside lookups.

use chrono::{DateTime, Utc};

use crate::health::SampleWindow;

/// Result from a cache-aside lookup, including data and where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
  /// Time range the data is complete for, when known
  pub window: Option<SampleWindow>,
}

impl<T> CacheResult<T> {
  /// Fresh data straight from the data source.
  pub fn from_source(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Source,
      cached_at: None,
      window: None,
    }
  }

  /// Unexpired data served from the cache.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
      window: None,
    }
  }

  /// Nothing cached and the fetch was suppressed.
  pub fn throttled() -> Self
  where
    T: Default,
  {
    Self {
      data: T::default(),
      source: CacheSource::Throttled,
      cached_at: None,
      window: None,
    }
  }

  pub fn with_window(mut self, window: SampleWindow) -> Self {
    self.window = Some(window);
    self
  }

  pub fn is_throttled(&self) -> bool {
    self.source == CacheSource::Throttled
  }
}

/// Indicates where cache-aside data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the data source and stored
  Source,
  /// Unexpired cache entry
  Cache,
  /// No fresh entry and the throttle suppressed a fetch
  Throttled,
}

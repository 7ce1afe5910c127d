//! The cache service: sole owner of metric caches, throttle state and counters.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::config::CacheConfiguration;
use super::entry::{CacheEntry, MetricCache};
use super::stats::CacheStatistics;
use super::storage::{CacheStorage, NoopStorage};
use super::throttle::ThrottleRegistry;
use super::traits::CacheResult;
use crate::clock::{Clock, SystemClock};
use crate::health::{HealthSample, MetricType, SampleWindow};

/// Samples from one fetch, with the range the fetch covered when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleSet {
  samples: Vec<HealthSample>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  window: Option<SampleWindow>,
}

type SampleCache = MetricCache<SampleSet>;

/// Everything the service guards. Only touched while holding the lock.
#[derive(Default)]
struct CacheState {
  metrics: HashMap<MetricType, SampleCache>,
  aggregates: HashMap<String, CacheEntry<serde_json::Value>>,
  throttle: ThrottleRegistry,
  stats: CacheStatistics,
}

/// Serialized owner of all cached health data.
///
/// Every public operation runs under one mutex, so no caller can observe a
/// half-applied store or clear. Operations are in-memory and never suspend.
/// The disk mirror is written after the state lock is released, in mutation
/// order, and its failures are only logged.
pub struct CacheService {
  config: CacheConfiguration,
  storage: Arc<dyn CacheStorage>,
  clock: Arc<dyn Clock>,
  state: Mutex<CacheState>,
  /// Orders mirror writes; taken before `state` is released
  io: Mutex<()>,
}

impl CacheService {
  /// Create a service on the wall clock, loading any persisted entries.
  pub fn new(config: CacheConfiguration, storage: Arc<dyn CacheStorage>) -> Self {
    Self::with_clock(config, storage, Arc::new(SystemClock))
  }

  /// Create a service that never touches disk.
  pub fn in_memory(config: CacheConfiguration) -> Self {
    Self::new(config, Arc::new(NoopStorage))
  }

  pub fn with_clock(
    config: CacheConfiguration,
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let service = Self {
      config,
      storage,
      clock,
      state: Mutex::new(CacheState::default()),
      io: Mutex::new(()),
    };
    if service.config.persist_to_disk {
      service.load_persisted();
    }
    service
  }

  pub fn configuration(&self) -> CacheConfiguration {
    self.config
  }

  /// See [`CacheConfiguration::recommended`].
  pub fn recommended_configuration(
    battery_level: Option<f32>,
    low_power_mode: bool,
  ) -> CacheConfiguration {
    CacheConfiguration::recommended(battery_level, low_power_mode)
  }

  fn lock(&self) -> MutexGuard<'_, CacheState> {
    // State is plain data left consistent by every operation, so a panic
    // elsewhere doesn't make it unusable.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_io(&self) -> MutexGuard<'_, ()> {
    self.io.lock().unwrap_or_else(PoisonError::into_inner)
  }

  // ==========================================================================
  // Metric series
  // ==========================================================================

  /// Append a new entry for `metric`, trim, and mirror it to disk.
  pub fn store(&self, metric: MetricType, values: Vec<HealthSample>) {
    self.store_set(metric, SampleSet {
      samples: values,
      window: None,
    });
  }

  /// Like [`CacheService::store`], remembering that `values` are every sample
  /// in `window`. Only such entries can answer [`CacheService::fetch_or_load`].
  pub fn store_window(&self, metric: MetricType, window: SampleWindow, values: Vec<HealthSample>) {
    self.store_set(metric, SampleSet {
      samples: values,
      window: Some(window),
    });
  }

  fn store_set(&self, metric: MetricType, set: SampleSet) {
    let now = self.clock.now();
    let key = metric.storage_key();

    let (payload, _io) = {
      let mut state = self.lock();
      let cache = state.metrics.entry(metric).or_default();
      cache.push(CacheEntry::new(set, now, self.config.cache_duration));
      cache.trim(now, self.config.max_cache_size);

      debug!(metric = %metric, entries = cache.len(), "stored metric samples");

      if !self.config.persist_to_disk {
        return;
      }
      let entries: Vec<&CacheEntry<SampleSet>> = cache.entries().collect();
      let payload = encode(key, &entries);
      (payload, self.lock_io())
    };

    if let Some(payload) = payload {
      self.write_document(key, &payload);
    }
  }

  /// Most recent unexpired samples for `metric`. Counts a hit or a miss.
  pub fn fetch_cached(&self, metric: MetricType) -> Option<Vec<HealthSample>> {
    let now = self.clock.now();
    let mut state = self.lock();

    let found = state
      .metrics
      .get(&metric)
      .and_then(|cache| cache.latest(now))
      .map(|entry| entry.value.samples.clone());

    record_lookup(&mut state.stats, metric, found.is_some());
    found
  }

  /// The part of `wanted` the latest fresh entry answers, with its samples
  /// and creation time. Entries stored without a window never answer.
  fn fetch_covering(
    &self,
    metric: MetricType,
    wanted: SampleWindow,
  ) -> Option<(Vec<HealthSample>, SampleWindow, DateTime<Utc>)> {
    let now = self.clock.now();
    let mut state = self.lock();

    let found = state
      .metrics
      .get(&metric)
      .and_then(|cache| cache.latest(now))
      .and_then(|entry| {
        let covered = entry.value.window?.clip(wanted)?;
        let samples = entry
          .value
          .samples
          .iter()
          .filter(|s| covered.contains(s.timestamp))
          .cloned()
          .collect();
        Some((samples, covered, entry.created_at))
      });

    record_lookup(&mut state.stats, metric, found.is_some());
    found
  }

  /// Number of entries currently held for `metric`, expired ones included
  /// until the next trim.
  pub fn entry_count(&self, metric: MetricType) -> usize {
    self.lock().metrics.get(&metric).map_or(0, MetricCache::len)
  }

  // ==========================================================================
  // Throttling
  // ==========================================================================

  /// Whether a fetch for `metric` would come too soon after the last one.
  ///
  /// Counts a throttle when true. Does not touch the throttle entry.
  pub fn should_throttle(&self, metric: MetricType) -> bool {
    let now = self.clock.now();
    let mut state = self.lock();

    let throttled = state
      .throttle
      .should_throttle(metric, now, self.config.throttle_interval);
    if throttled {
      state.stats.record_throttle();
      debug!(metric = %metric, "fetch throttled");
    }

    throttled
  }

  /// Mark an attempted fetch for `metric`, whether or not it succeeds.
  pub fn record_fetch(&self, metric: MetricType) {
    let now = self.clock.now();
    self.lock().throttle.record(metric, now);
  }

  pub fn remaining_throttle_time(&self, metric: MetricType) -> Duration {
    let now = self.clock.now();
    self
      .lock()
      .throttle
      .remaining(metric, now, self.config.throttle_interval)
  }

  // ==========================================================================
  // Aggregates
  // ==========================================================================

  /// Cache an arbitrary serializable aggregate under `key`.
  pub fn store_aggregate<T: Serialize>(&self, key: &str, value: &T) {
    let value = match serde_json::to_value(value) {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "aggregate is not serializable; not cached");
        return;
      }
    };

    let now = self.clock.now();
    let storage_key = aggregate_key(key);

    let (payload, _io) = {
      let mut state = self.lock();
      state.aggregates.retain(|_, entry| !entry.is_expired(now));

      let entry = CacheEntry::new(value, now, self.config.cache_duration);
      let payload = if self.config.persist_to_disk {
        encode(&storage_key, &entry)
      } else {
        None
      };
      state.aggregates.insert(key.to_string(), entry);

      match payload {
        Some(payload) => (payload, self.lock_io()),
        None => return,
      }
    };

    self.write_document(&storage_key, &payload);
  }

  /// Fetch an unexpired aggregate, falling back to the disk mirror when it
  /// isn't in memory. Counts a hit or a miss.
  pub fn fetch_aggregate<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let now = self.clock.now();
    let mut state = self.lock();

    if !state.aggregates.contains_key(key) && self.config.persist_to_disk {
      if let Some(entry) = self.load_aggregate(key) {
        state.aggregates.insert(key.to_string(), entry);
      }
    }

    let found = state
      .aggregates
      .get(key)
      .filter(|entry| !entry.is_expired(now))
      .and_then(|entry| match serde_json::from_value(entry.value.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
          warn!(key, error = %e, "cached aggregate has unexpected shape");
          None
        }
      });

    if found.is_some() {
      state.stats.record_hit();
    } else {
      state.stats.record_miss();
    }

    found
  }

  pub fn clear_aggregate(&self, key: &str) {
    let io = {
      let mut state = self.lock();
      state.aggregates.remove(key);
      self.config.persist_to_disk.then(|| self.lock_io())
    };
    if let Some(_io) = io {
      self.unpersist(&aggregate_key(key));
    }
  }

  // ==========================================================================
  // Clearing and statistics
  // ==========================================================================

  /// Empty the cache and throttle state for one metric type.
  pub fn clear_for(&self, metric: MetricType) {
    let io = {
      let mut state = self.lock();
      state.metrics.remove(&metric);
      state.throttle.clear(metric);
      self.config.persist_to_disk.then(|| self.lock_io())
    };
    if let Some(_io) = io {
      self.unpersist(metric.storage_key());
    }
  }

  /// Empty every cache, aggregate and throttle entry. Statistics are kept.
  pub fn clear_all(&self) {
    let io = {
      let mut state = self.lock();
      state.metrics.clear();
      state.aggregates.clear();
      state.throttle.clear_all();
      self.config.persist_to_disk.then(|| self.lock_io())
    };
    if let Some(_io) = io {
      if let Err(e) = self.storage.clear_all() {
        warn!(error = %e, "failed to clear persisted cache");
      }
    }
  }

  pub fn statistics(&self) -> CacheStatistics {
    self.lock().stats
  }

  pub fn reset_statistics(&self) {
    self.lock().stats.reset();
  }

  // ==========================================================================
  // Cache-aside
  // ==========================================================================

  /// Serve `metric` over `window` from cache, or load it through `loader`
  /// unless throttled.
  ///
  /// 1. Fresh entry whose fetch window reaches back to `window.start` -
  ///    return its samples, with `window` cut at that fetch's end
  /// 2. Throttled - return nothing
  /// 3. Otherwise record the attempt, load, store and return
  ///
  /// The attempt is recorded before loading, so a failing loader is still
  /// throttled. The lock is never held across the await.
  pub async fn fetch_or_load<F, Fut>(
    &self,
    metric: MetricType,
    window: SampleWindow,
    loader: F,
  ) -> Result<CacheResult<Vec<HealthSample>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<HealthSample>>>,
  {
    if let Some((values, covered, cached_at)) = self.fetch_covering(metric, window) {
      return Ok(CacheResult::from_cache(values, cached_at).with_window(covered));
    }

    if self.should_throttle(metric) {
      return Ok(CacheResult::throttled());
    }

    self.record_fetch(metric);
    let values = loader().await?;
    self.store_window(metric, window, values.clone());

    Ok(CacheResult::from_source(values).with_window(window))
  }

  // ==========================================================================
  // Persistence
  // ==========================================================================

  fn write_document(&self, key: &str, payload: &[u8]) {
    if let Err(e) = self.storage.write(key, payload) {
      warn!(key, error = %e, "failed to persist cache document");
    }
  }

  fn unpersist(&self, key: &str) {
    if let Err(e) = self.storage.clear(key) {
      warn!(key, error = %e, "failed to clear persisted cache document");
    }
  }

  fn load_persisted(&self) {
    let now = self.clock.now();
    let mut state = self.lock();

    for metric in MetricType::ALL {
      let key = metric.storage_key();
      let payload = match self.storage.read(key) {
        Ok(Some(payload)) => payload,
        Ok(None) => continue,
        Err(e) => {
          warn!(key, error = %e, "failed to read persisted cache");
          continue;
        }
      };

      match serde_json::from_slice::<Vec<CacheEntry<SampleSet>>>(&payload) {
        Ok(entries) => {
          let mut cache = MetricCache::from_entries(entries);
          cache.trim(now, self.config.max_cache_size);
          debug!(metric = %metric, entries = cache.len(), "loaded persisted cache");
          if !cache.is_empty() {
            state.metrics.insert(metric, cache);
          }
        }
        Err(e) => warn!(key, error = %e, "discarding unreadable persisted cache"),
      }
    }
  }

  fn load_aggregate(&self, key: &str) -> Option<CacheEntry<serde_json::Value>> {
    let storage_key = aggregate_key(key);
    match self.storage.read(&storage_key) {
      Ok(Some(payload)) => match serde_json::from_slice(&payload) {
        Ok(entry) => Some(entry),
        Err(e) => {
          warn!(key = %storage_key, error = %e, "discarding unreadable persisted aggregate");
          None
        }
      },
      Ok(None) => None,
      Err(e) => {
        warn!(key = %storage_key, error = %e, "failed to read persisted aggregate");
        None
      }
    }
  }
}

fn record_lookup(stats: &mut CacheStatistics, metric: MetricType, hit: bool) {
  if hit {
    stats.record_hit();
    debug!(metric = %metric, "cache hit");
  } else {
    stats.record_miss();
    debug!(metric = %metric, "cache miss");
  }
}

fn encode<D: Serialize + ?Sized>(key: &str, document: &D) -> Option<Vec<u8>> {
  match serde_json::to_vec(document) {
    Ok(payload) => Some(payload),
    Err(e) => {
      warn!(key, error = %e, "failed to serialize cache document");
      None
    }
  }
}

fn aggregate_key(key: &str) -> String {
  format!("aggregated_{}", key)
}

//! Hit, miss and throttle counters.

use serde::Serialize;

/// Monotonic cache counters. Only `reset` clears them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
  pub hit_count: u64,
  pub miss_count: u64,
  pub throttle_count: u64,
  pub total_queries: u64,
}

impl CacheStatistics {
  pub fn record_hit(&mut self) {
    self.hit_count += 1;
    self.total_queries += 1;
  }

  pub fn record_miss(&mut self) {
    self.miss_count += 1;
    self.total_queries += 1;
  }

  pub fn record_throttle(&mut self) {
    self.throttle_count += 1;
  }

  pub fn hit_rate(&self) -> f64 {
    ratio(self.hit_count, self.total_queries)
  }

  pub fn throttle_rate(&self) -> f64 {
    ratio(self.throttle_count, self.total_queries)
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }
}

fn ratio(count: u64, total: u64) -> f64 {
  if total == 0 {
    0.0
  } else {
    count as f64 / total as f64
  }
}

//! Per-metric fetch throttling.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::health::MetricType;

/// Last recorded fetch time per metric type.
#[derive(Debug, Clone, Default)]
pub struct ThrottleRegistry {
  last_fetch: HashMap<MetricType, DateTime<Utc>>,
}

impl ThrottleRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Overwrite the last fetch time for `metric`.
  pub fn record(&mut self, metric: MetricType, at: DateTime<Utc>) {
    self.last_fetch.insert(metric, at);
  }

  /// `max(0, interval - (now - last_fetch))`; zero if never fetched.
  pub fn remaining(&self, metric: MetricType, now: DateTime<Utc>, interval: Duration) -> Duration {
    match self.last_fetch.get(&metric) {
      Some(last) => (interval - (now - *last)).max(Duration::zero()),
      None => Duration::zero(),
    }
  }

  pub fn should_throttle(&self, metric: MetricType, now: DateTime<Utc>, interval: Duration) -> bool {
    self.remaining(metric, now, interval) > Duration::zero()
  }

  pub fn last_fetch(&self, metric: MetricType) -> Option<DateTime<Utc>> {
    self.last_fetch.get(&metric).copied()
  }

  pub fn clear(&mut self, metric: MetricType) {
    self.last_fetch.remove(&metric);
  }

  pub fn clear_all(&mut self) {
    self.last_fetch.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_never_fetched_is_not_throttled() {
    let registry = ThrottleRegistry::new();
    let now = Utc::now();
    assert!(!registry.should_throttle(MetricType::Steps, now, Duration::seconds(60)));
    assert_eq!(
      registry.remaining(MetricType::Steps, now, Duration::seconds(60)),
      Duration::zero()
    );
  }

  #[test]
  fn test_throttle_window() {
    let mut registry = ThrottleRegistry::new();
    let now = Utc::now();
    let interval = Duration::seconds(60);
    registry.record(MetricType::Steps, now);

    assert!(registry.should_throttle(MetricType::Steps, now, interval));
    assert_eq!(
      registry.remaining(MetricType::Steps, now + Duration::seconds(45), interval),
      Duration::seconds(15)
    );
    assert!(!registry.should_throttle(MetricType::Steps, now + interval, interval));
    assert!(!registry.should_throttle(MetricType::HeartRate, now, interval));
  }

  #[test]
  fn test_record_overwrites() {
    let mut registry = ThrottleRegistry::new();
    let now = Utc::now();
    registry.record(MetricType::Sleep, now);
    registry.record(MetricType::Sleep, now + Duration::seconds(30));
    assert_eq!(
      registry.last_fetch(MetricType::Sleep),
      Some(now + Duration::seconds(30))
    );

    registry.clear(MetricType::Sleep);
    assert!(registry.last_fetch(MetricType::Sleep).is_none());
  }
}

//! Cache tuning presets.

use chrono::Duration;

/// Immutable cache tuning: entry lifetime, fetch throttle, size cap and
/// whether writes are mirrored to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfiguration {
  pub cache_duration: Duration,
  pub throttle_interval: Duration,
  pub max_cache_size: usize,
  pub persist_to_disk: bool,
}

impl Default for CacheConfiguration {
  /// Five minute entries, one fetch per minute.
  fn default() -> Self {
    Self {
      cache_duration: Duration::minutes(5),
      throttle_interval: Duration::minutes(1),
      max_cache_size: 100,
      persist_to_disk: true,
    }
  }
}

impl CacheConfiguration {
  /// Long-lived entries and a slow throttle, for low battery.
  pub fn aggressive() -> Self {
    Self {
      cache_duration: Duration::hours(1),
      throttle_interval: Duration::minutes(5),
      max_cache_size: 200,
      persist_to_disk: true,
    }
  }

  /// Short-lived entries and a fast throttle, for a charged device.
  pub fn realtime() -> Self {
    Self {
      cache_duration: Duration::minutes(1),
      throttle_interval: Duration::seconds(10),
      max_cache_size: 50,
      persist_to_disk: false,
    }
  }

  /// Pick a preset from the device's power state.
  ///
  /// `battery_level` is a fraction in `[0, 1]`; `None` when unknown.
  pub fn recommended(battery_level: Option<f32>, low_power_mode: bool) -> Self {
    match battery_level {
      _ if low_power_mode => Self::aggressive(),
      Some(level) if level < 0.2 => Self::aggressive(),
      Some(level) if level > 0.5 => Self::realtime(),
      _ => Self::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_recommended_configuration() {
    assert_eq!(
      CacheConfiguration::recommended(Some(0.1), false),
      CacheConfiguration::aggressive()
    );
    assert_eq!(
      CacheConfiguration::recommended(Some(0.9), true),
      CacheConfiguration::aggressive()
    );
    assert_eq!(
      CacheConfiguration::recommended(Some(0.8), false),
      CacheConfiguration::realtime()
    );
    assert_eq!(
      CacheConfiguration::recommended(Some(0.35), false),
      CacheConfiguration::default()
    );
    assert_eq!(
      CacheConfiguration::recommended(None, false),
      CacheConfiguration::default()
    );
  }

  #[test]
  fn test_boundaries_fall_to_default() {
    assert_eq!(
      CacheConfiguration::recommended(Some(0.2), false),
      CacheConfiguration::default()
    );
    assert_eq!(
      CacheConfiguration::recommended(Some(0.5), false),
      CacheConfiguration::default()
    );
  }
}

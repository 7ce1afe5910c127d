//! Sync engine tuning.

use chrono::Duration;

/// Immutable sync tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfiguration {
  /// Upper bound on data points per upload request
  pub max_batch_size: usize,
  /// Period of the automatic sync timer; zero or negative disables it
  pub sync_interval: Duration,
  /// Only sync on an unmetered network
  pub wifi_only: bool,
  /// Fraction in `[0, 1]` below which syncing is refused
  pub minimum_battery_level: f32,
  /// Whether the automatic timer should run
  pub background_sync_enabled: bool,
}

impl Default for SyncConfiguration {
  fn default() -> Self {
    Self {
      max_batch_size: 100,
      sync_interval: Duration::hours(1),
      wifi_only: false,
      minimum_battery_level: 0.2,
      background_sync_enabled: true,
    }
  }
}

/// Days looked back for a metric type that has never synced.
pub const FIRST_SYNC_LOOKBACK_DAYS: i64 = 7;

/// Days looked back by on-demand partial syncs.
pub const PARTIAL_SYNC_LOOKBACK_DAYS: i64 = 1;

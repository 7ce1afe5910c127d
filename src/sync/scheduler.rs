//! Periodic automatic sync.

use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::engine::{SyncEngine, SyncOutcome};

/// Handle on a running timer task.
pub(crate) struct AutoSync {
  shutdown: Arc<Notify>,
  handle: JoinHandle<()>,
}

impl SyncEngine {
  /// Start calling [`SyncEngine::sync_now`] every `sync_interval`.
  ///
  /// Must be called from within a Tokio runtime. Each tick runs the sync as
  /// its own task, so errors are logged and never stop the timer. Returns
  /// false when the interval is not positive. Starting twice is a no-op.
  pub fn start_automatic_sync(self: &Arc<Self>) -> bool {
    let period = match self.configuration().sync_interval.to_std() {
      Ok(period) if !period.is_zero() => period,
      _ => {
        debug!("automatic sync disabled: interval is not positive");
        return false;
      }
    };

    let mut slot = self.auto_sync.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.as_ref().is_some_and(|auto| !auto.handle.is_finished()) {
      return true;
    }

    let shutdown = Arc::new(Notify::new());
    let handle = tokio::spawn(run_timer(Arc::downgrade(self), period, Arc::clone(&shutdown)));
    *slot = Some(AutoSync { shutdown, handle });

    info!(interval_secs = period.as_secs(), "automatic sync started");
    true
  }

  /// Cancel future timer firings. A sync already in flight keeps running.
  pub fn stop_automatic_sync(&self) -> bool {
    let auto = self
      .auto_sync
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();

    match auto {
      Some(auto) => {
        auto.shutdown.notify_one();
        info!("automatic sync stopped");
        true
      }
      None => false,
    }
  }

  pub fn is_automatic_sync_running(&self) -> bool {
    self
      .auto_sync
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .is_some_and(|auto| !auto.handle.is_finished())
  }
}

async fn run_timer(engine: Weak<SyncEngine>, period: std::time::Duration, shutdown: Arc<Notify>) {
  // First firing one full period after start
  let mut ticker = interval_at(Instant::now() + period, period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let Some(engine) = engine.upgrade() else {
          debug!("sync engine dropped; stopping timer");
          break;
        };

        tokio::spawn(async move {
          match engine.sync_now().await {
            Ok(SyncOutcome::Completed(report)) => {
              debug!(uploaded = report.uploaded_points, "automatic sync finished");
            }
            Ok(SyncOutcome::AlreadySyncing) => debug!("automatic sync skipped: sync in progress"),
            Err(e) => error!(error = %e, "automatic sync failed"),
          }
        });
      }
      _ = shutdown.notified() => break,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::Clock;
  use crate::health::MetricType;
  use crate::sync::config::SyncConfiguration;
  use crate::sync::device::{NetworkKind, StaticDeviceMonitor};
  use crate::sync::testing::{harness, steps_at, FakeTransport};
  use chrono::Duration;

  fn device(battery: f32) -> StaticDeviceMonitor {
    StaticDeviceMonitor {
      battery_level: Some(battery),
      low_power_mode: false,
      network: NetworkKind::Wifi,
    }
  }

  fn every_minute() -> SyncConfiguration {
    SyncConfiguration {
      sync_interval: Duration::seconds(60),
      ..SyncConfiguration::default()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_timer_fires_each_interval_until_stopped() {
    let h = harness(every_minute(), device(0.9), FakeTransport::default());
    h.source.put(MetricType::Steps, steps_at(h.clock.now() - Duration::minutes(1), 2));

    assert!(h.engine.start_automatic_sync());
    assert!(h.engine.is_automatic_sync_running());

    // Nothing before the first period elapses
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    assert!(h.transport.sizes().is_empty());

    tokio::time::sleep(std::time::Duration::from_secs(31)).await;
    assert_eq!(h.transport.sizes(), vec![2]);
    assert!(h.engine.state().is_success());

    assert!(h.engine.stop_automatic_sync());
    assert!(!h.engine.is_automatic_sync_running());
    tokio::time::sleep(std::time::Duration::from_secs(600)).await;
    assert_eq!(h.engine.statistics().last_sync, Some(h.clock.now()));
    assert_eq!(h.transport.sizes(), vec![2]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timer_survives_failed_syncs() {
    let h = harness(every_minute(), device(0.05), FakeTransport::default());
    assert!(h.engine.start_automatic_sync());

    tokio::time::sleep(std::time::Duration::from_secs(181)).await;
    assert_eq!(h.engine.statistics().failed_attempts, 3);
    assert!(h.engine.is_automatic_sync_running());

    h.engine.stop_automatic_sync();
  }

  #[tokio::test]
  async fn test_non_positive_interval_disables_timer() {
    let config = SyncConfiguration {
      sync_interval: Duration::zero(),
      ..SyncConfiguration::default()
    };
    let h = harness(config, device(0.9), FakeTransport::default());
    assert!(!h.engine.start_automatic_sync());
    assert!(!h.engine.is_automatic_sync_running());
    assert!(!h.engine.stop_automatic_sync());

    let negative = SyncConfiguration {
      sync_interval: Duration::seconds(-5),
      ..SyncConfiguration::default()
    };
    let h = harness(negative, device(0.9), FakeTransport::default());
    assert!(!h.engine.start_automatic_sync());
  }

  #[tokio::test(start_paused = true)]
  async fn test_start_twice_keeps_one_timer() {
    let h = harness(every_minute(), device(0.9), FakeTransport::default());
    h.source.put(MetricType::Steps, steps_at(h.clock.now(), 1));

    assert!(h.engine.start_automatic_sync());
    assert!(h.engine.start_automatic_sync());

    tokio::time::sleep(std::time::Duration::from_secs(61)).await;
    assert_eq!(h.transport.sizes().len(), 1);
    h.engine.stop_automatic_sync();
  }
}

//! Errors surfaced by the sync engine.

use thiserror::Error;

/// Why a sync or retry did not complete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
  #[error("battery too low to sync ({:.0}% < {:.0}%)", percent(.level), percent(.minimum))]
  LowBattery { level: f32, minimum: f32 },

  #[error("WiFi required for sync")]
  WifiRequired,

  #[error("upload failed: {0}")]
  UploadFailed(String),
}

fn percent(fraction: &f32) -> f32 {
  fraction * 100.0
}

/// Result of draining the pending upload queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
  /// Every queued batch was delivered (possibly none were queued)
  Success { retried: usize },
  /// The first `success_count` batches were delivered, then one failed
  PartialFailure {
    success_count: usize,
    /// The failure that stopped the pass. Retry halts at the first failed
    /// batch, so this always holds exactly one error.
    errors: Vec<SyncError>,
  },
  /// Another retry pass is already running
  AlreadyRunning,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    let low = SyncError::LowBattery {
      level: 0.12,
      minimum: 0.2,
    };
    assert_eq!(low.to_string(), "battery too low to sync (12% < 20%)");
    assert_eq!(SyncError::WifiRequired.to_string(), "WiFi required for sync");
    assert_eq!(
      SyncError::UploadFailed("503 Service Unavailable".into()).to_string(),
      "upload failed: 503 Service Unavailable"
    );
  }
}

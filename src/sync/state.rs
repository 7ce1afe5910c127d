//! Sync lifecycle state.

use serde::Serialize;

/// The state of the sync engine.
///
/// `Idle -> Syncing -> Success | Failed`, and back to `Syncing` on the next
/// start. A start while `Syncing` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "camelCase")]
pub enum SyncState {
  /// No sync has run yet
  #[default]
  Idle,
  /// A sync is in flight
  Syncing,
  /// The last sync completed
  Success,
  /// The last sync failed with the given message
  Failed(String),
}

impl SyncState {
  pub fn is_syncing(&self) -> bool {
    matches!(self, SyncState::Syncing)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, SyncState::Success)
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, SyncState::Failed(_))
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      SyncState::Failed(e) => Some(e),
      _ => None,
    }
  }
}

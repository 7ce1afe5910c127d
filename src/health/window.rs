//! Sample time windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time range `(start, end]`.
///
/// Consecutive syncs use the previous `end` as the next `start`, so a sample
/// stamped exactly on the boundary belongs to the earlier window only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleWindow {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

impl SampleWindow {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self { start, end }
  }

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    at > self.start && at <= self.end
  }

  /// The part of `wanted` this window can answer, from `wanted.start` up to
  /// the earlier of the two ends.
  ///
  /// `None` when this window starts after `wanted` does, or ends before it
  /// starts: answering would leave a gap at the front.
  pub fn clip(&self, wanted: SampleWindow) -> Option<SampleWindow> {
    if self.start > wanted.start || self.end < wanted.start {
      return None;
    }
    Some(SampleWindow::new(wanted.start, self.end.min(wanted.end)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_window_is_open_at_start() {
    let t0 = Utc::now();
    let window = SampleWindow::new(t0, t0 + Duration::hours(1));

    assert!(!window.contains(t0));
    assert!(window.contains(t0 + Duration::seconds(1)));
    assert!(window.contains(t0 + Duration::hours(1)));
    assert!(!window.contains(t0 + Duration::hours(1) + Duration::seconds(1)));
  }

  #[test]
  fn test_clip() {
    let t0 = Utc::now();
    let fetched = SampleWindow::new(t0 - Duration::days(7), t0);

    // Later request: answerable only up to the fetch end
    let later = SampleWindow::new(t0 - Duration::minutes(5), t0 + Duration::minutes(2));
    assert_eq!(
      fetched.clip(later),
      Some(SampleWindow::new(t0 - Duration::minutes(5), t0))
    );

    // Request reaching further back than the fetch: unanswerable
    let wider = SampleWindow::new(t0 - Duration::days(8), t0);
    assert_eq!(fetched.clip(wider), None);

    // Request starting after the fetch ended
    let after = SampleWindow::new(t0 + Duration::seconds(1), t0 + Duration::hours(1));
    assert_eq!(fetched.clip(after), None);
  }
}

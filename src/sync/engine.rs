//! Sync engine: gate, fetch, batch, upload and retry.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::config::{SyncConfiguration, FIRST_SYNC_LOOKBACK_DAYS, PARTIAL_SYNC_LOOKBACK_DAYS};
use super::device::DeviceMonitor;
use super::error::{RetryOutcome, SyncError};
use super::scheduler::AutoSync;
use super::state::SyncState;
use crate::cache::CacheService;
use crate::clock::{Clock, SystemClock};
use crate::health::{DataPoint, HealthDataBatch, HealthSample, MetricType, SampleWindow};
use crate::source::DataSource;
use crate::transport::UploadTransport;

/// What a completed sync delivered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
  /// Data points confirmed uploaded
  pub uploaded_points: usize,
  /// Upload requests made
  pub chunks: usize,
  /// Metric types that were throttled or failed to fetch
  pub skipped: Vec<MetricType>,
}

/// Result of asking for a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  Completed(SyncReport),
  /// Another sync was in flight; nothing was done
  AlreadySyncing,
}

/// Point-in-time view of the engine's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatistics {
  pub total_synced: u64,
  pub last_sync: Option<DateTime<Utc>>,
  pub failed_attempts: u32,
  pub pending_batch_count: usize,
  pub current_state: SyncState,
}

/// Engine-owned mutable state. Never held across an await.
#[derive(Default)]
pub(super) struct EngineState {
  pub(super) sync_state: SyncState,
  /// End of the last successfully synced window, per metric type
  pub(super) watermarks: HashMap<MetricType, DateTime<Utc>>,
  pub(super) last_sync: Option<DateTime<Utc>>,
  pub(super) total_synced: u64,
  pub(super) failed_attempts: u32,
  pub(super) pending: VecDeque<HealthDataBatch>,
  pub(super) retrying: bool,
}

/// How a sync chooses each metric type's window.
#[derive(Debug, Clone, Copy)]
enum Window {
  /// From the type's watermark (or the first-sync lookback) to now.
  SinceLastSync,
  /// At most this far back, starting at the watermark when it is newer.
  Lookback(Duration),
}

/// One metric type's share of the assembled batch.
struct Segment {
  metric: MetricType,
  /// Positions of its points in the batch, sorted by timestamp
  points: Range<usize>,
  /// End of the window its data is complete for
  covered_until: DateTime<Utc>,
  /// Whether delivering its points may move its watermark
  advances: bool,
}

/// Data gathered and delivered by one sync pass.
struct SyncRun {
  report: SyncReport,
  window_end: DateTime<Utc>,
}

/// Orchestrates health data uploads.
///
/// At most one sync runs at a time: a start while `Syncing` returns
/// [`SyncOutcome::AlreadySyncing`] without touching any state. Batches that
/// fail to upload are kept in a FIFO queue for [`SyncEngine::retry_failed_uploads`].
pub struct SyncEngine {
  config: SyncConfiguration,
  owner_id: String,
  metrics: Vec<MetricType>,
  cache: Arc<CacheService>,
  source: Arc<dyn DataSource>,
  transport: Arc<dyn UploadTransport>,
  device: Arc<dyn DeviceMonitor>,
  clock: Arc<dyn Clock>,
  state: Mutex<EngineState>,
  pub(super) auto_sync: Mutex<Option<AutoSync>>,
}

impl SyncEngine {
  pub fn new(
    config: SyncConfiguration,
    owner_id: impl Into<String>,
    cache: Arc<CacheService>,
    source: Arc<dyn DataSource>,
    transport: Arc<dyn UploadTransport>,
    device: Arc<dyn DeviceMonitor>,
  ) -> Self {
    Self {
      config,
      owner_id: owner_id.into(),
      metrics: MetricType::ALL.to_vec(),
      cache,
      source,
      transport,
      device,
      clock: Arc::new(SystemClock),
      state: Mutex::new(EngineState::default()),
      auto_sync: Mutex::new(None),
    }
  }

  /// Use a different time source.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Restrict full syncs to `metrics`, in the given order.
  pub fn with_metrics(mut self, metrics: Vec<MetricType>) -> Self {
    self.metrics = metrics;
    self
  }

  pub fn configuration(&self) -> &SyncConfiguration {
    &self.config
  }

  pub(super) fn lock(&self) -> MutexGuard<'_, EngineState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  // ==========================================================================
  // Sync
  // ==========================================================================

  /// Sync every tracked metric type since its last successful sync.
  pub async fn sync_now(&self) -> Result<SyncOutcome, SyncError> {
    let metrics = self.metrics.clone();
    self.run(&metrics, Window::SinceLastSync).await
  }

  /// Sync only `metrics` over at most the last day.
  ///
  /// A type whose watermark falls within that day syncs from the watermark
  /// and advances it as usual. Otherwise the day is uploaded without moving
  /// the watermark, so the gap before it is still covered by the next full
  /// sync.
  pub async fn sync_metrics(&self, metrics: &[MetricType]) -> Result<SyncOutcome, SyncError> {
    self
      .run(metrics, Window::Lookback(Duration::days(PARTIAL_SYNC_LOOKBACK_DAYS)))
      .await
  }

  async fn run(&self, metrics: &[MetricType], window: Window) -> Result<SyncOutcome, SyncError> {
    let Some(guard) = SyncGuard::begin(self) else {
      debug!("sync already in progress; ignoring start");
      return Ok(SyncOutcome::AlreadySyncing);
    };

    info!(metrics = ?metrics, ?window, "sync started");
    let result = self.perform(metrics, window).await;
    guard.finish(&result, matches!(window, Window::SinceLastSync));

    match result {
      Ok(run) => {
        info!(
          uploaded = run.report.uploaded_points,
          chunks = run.report.chunks,
          skipped = ?run.report.skipped,
          "sync completed"
        );
        Ok(SyncOutcome::Completed(run.report))
      }
      Err(e) => {
        warn!(error = %e, "sync failed");
        Err(e)
      }
    }
  }

  async fn perform(&self, metrics: &[MetricType], window: Window) -> Result<SyncRun, SyncError> {
    self.check_resources()?;

    let now = self.clock.now();
    let mut points = Vec::new();
    let mut segments = Vec::new();
    let mut skipped = Vec::new();

    for &metric in metrics {
      let (wanted, advances) = self.plan(metric, window, now);

      match self.collect(metric, wanted).await {
        Ok(Some((samples, covered_until))) => {
          let first = points.len();
          points.extend(samples.iter().filter_map(|sample| to_data_point(metric, sample)));
          segments.push(Segment {
            metric,
            points: first..points.len(),
            covered_until,
            advances,
          });
        }
        Ok(None) => {
          debug!(metric = %metric, "fetch throttled; skipping");
          skipped.push(metric);
        }
        Err(e) => {
          warn!(metric = %metric, error = %e, "failed to fetch metric; skipping");
          skipped.push(metric);
        }
      }
    }

    let mut report = SyncReport {
      skipped,
      ..SyncReport::default()
    };

    let stamps: Vec<DateTime<Utc>> = points.iter().map(|p| p.timestamp).collect();
    let batch = HealthDataBatch::new(self.owner_id.clone(), points);
    if batch.is_empty() {
      debug!("nothing to upload");
      self.advance_watermarks(&segments, &stamps, 0);
      return Ok(SyncRun {
        report,
        window_end: now,
      });
    }

    // Points are accounted for once delivered or queued for retry
    let mut accounted = 0;
    for chunk in batch.split(self.config.max_batch_size) {
      report.chunks += 1;
      accounted += chunk.len();

      match self.deliver(&chunk).await {
        Ok(()) => {
          report.uploaded_points += chunk.len();
          self.lock().total_synced += chunk.len() as u64;
          self.advance_watermarks(&segments, &stamps, accounted);
        }
        Err(reason) => {
          warn!(points = chunk.len(), reason = %reason, "upload failed; queueing chunk for retry");
          self.lock().pending.push_back(chunk);
          self.advance_watermarks(&segments, &stamps, accounted);
          return Err(SyncError::UploadFailed(reason));
        }
      }
    }

    Ok(SyncRun {
      report,
      window_end: now,
    })
  }

  fn check_resources(&self) -> Result<(), SyncError> {
    if let Some(level) = self.device.battery_level() {
      if level < self.config.minimum_battery_level {
        return Err(SyncError::LowBattery {
          level,
          minimum: self.config.minimum_battery_level,
        });
      }
    }

    if self.config.wifi_only && !self.device.network().is_unmetered() {
      return Err(SyncError::WifiRequired);
    }

    Ok(())
  }

  /// The window to fetch for `metric`, and whether it starts at the
  /// watermark (so delivering it may advance the watermark).
  fn plan(&self, metric: MetricType, window: Window, now: DateTime<Utc>) -> (SampleWindow, bool) {
    let watermark = self.lock().watermarks.get(&metric).copied();

    match window {
      Window::SinceLastSync => {
        let start = watermark.unwrap_or(now - Duration::days(FIRST_SYNC_LOOKBACK_DAYS));
        (SampleWindow::new(start, now), true)
      }
      Window::Lookback(lookback) => match watermark {
        Some(mark) if mark >= now - lookback => (SampleWindow::new(mark, now), true),
        _ => (SampleWindow::new(now - lookback, now), false),
      },
    }
  }

  /// Samples for `metric` in `wanted`, sorted by time, with the end of the
  /// range they are complete for. `None` when throttled.
  async fn collect(
    &self,
    metric: MetricType,
    wanted: SampleWindow,
  ) -> Result<Option<(Vec<HealthSample>, DateTime<Utc>)>> {
    let result = self
      .cache
      .fetch_or_load(metric, wanted, || self.source.fetch(metric, wanted, None))
      .await?;

    if result.is_throttled() {
      return Ok(None);
    }

    // A cached answer may stop short of `wanted.end`
    let covered = result.window.unwrap_or(wanted);
    let mut samples: Vec<HealthSample> = result
      .data
      .into_iter()
      .filter(|s| covered.contains(s.timestamp))
      .collect();
    samples.sort_by_key(|s| s.timestamp);

    Ok(Some((samples, covered.end)))
  }

  /// Move watermarks past every point in the first `accounted` positions.
  ///
  /// A metric whose points are all accounted for moves to the end of its
  /// covered window. One cut mid-way moves to its last accounted timestamp
  /// strictly before the first unaccounted one. Watermarks never move back.
  fn advance_watermarks(&self, segments: &[Segment], stamps: &[DateTime<Utc>], accounted: usize) {
    let mut state = self.lock();

    for segment in segments.iter().filter(|s| s.advances) {
      let mark = if segment.points.end <= accounted {
        Some(segment.covered_until)
      } else if segment.points.start < accounted {
        let next = stamps[accounted];
        stamps[segment.points.start..accounted]
          .iter()
          .rev()
          .copied()
          .find(|&at| at < next)
      } else {
        None
      };

      if let Some(mark) = mark {
        let slot = state.watermarks.entry(segment.metric).or_insert(mark);
        if *slot < mark {
          *slot = mark;
        }
      }
    }
  }

  /// Upload one batch; `Err` carries a human-readable reason.
  async fn deliver(&self, batch: &HealthDataBatch) -> Result<(), String> {
    match self.transport.upload(batch, &batch.owner_id).await {
      Ok(response) if response.success => Ok(()),
      Ok(response) => Err(
        response
          .message
          .unwrap_or_else(|| "rejected by server".to_string()),
      ),
      Err(e) => Err(e.to_string()),
    }
  }

  // ==========================================================================
  // Retry
  // ==========================================================================

  /// Re-upload queued batches oldest first, stopping at the first failure.
  pub async fn retry_failed_uploads(&self) -> RetryOutcome {
    let queued: Vec<HealthDataBatch> = {
      let mut state = self.lock();
      if state.retrying {
        return RetryOutcome::AlreadyRunning;
      }
      state.retrying = true;
      state.pending.iter().cloned().collect()
    };
    let _guard = RetryGuard(self);

    if queued.is_empty() {
      return RetryOutcome::Success { retried: 0 };
    }
    info!(batches = queued.len(), "retrying failed uploads");

    let mut success_count = 0;
    for batch in &queued {
      match self.deliver(batch).await {
        Ok(()) => {
          let mut state = self.lock();
          // Syncs only append, so the front is still this batch
          state.pending.pop_front();
          state.total_synced += batch.len() as u64;
          success_count += 1;
        }
        Err(reason) => {
          warn!(delivered = success_count, reason = %reason, "retry stopped at failed batch");
          return RetryOutcome::PartialFailure {
            success_count,
            errors: vec![SyncError::UploadFailed(reason)],
          };
        }
      }
    }

    RetryOutcome::Success {
      retried: success_count,
    }
  }

  // ==========================================================================
  // Observability
  // ==========================================================================

  pub fn statistics(&self) -> SyncStatistics {
    let state = self.lock();
    SyncStatistics {
      total_synced: state.total_synced,
      last_sync: state.last_sync,
      failed_attempts: state.failed_attempts,
      pending_batch_count: state.pending.len(),
      current_state: state.sync_state.clone(),
    }
  }

  pub fn state(&self) -> SyncState {
    self.lock().sync_state.clone()
  }

  /// End of the last successfully synced window for `metric`.
  pub fn last_synced(&self, metric: MetricType) -> Option<DateTime<Utc>> {
    self.lock().watermarks.get(&metric).copied()
  }

  pub fn pending_batches(&self) -> Vec<HealthDataBatch> {
    self.lock().pending.iter().cloned().collect()
  }
}

fn to_data_point(metric: MetricType, sample: &HealthSample) -> Option<DataPoint> {
  match DataPoint::from_sample(sample) {
    Ok(point) => Some(point),
    Err(e) => {
      warn!(metric = %metric, error = %e, "dropping unserializable sample");
      None
    }
  }
}

/// Holds the `Syncing` state for one run.
///
/// If the run is dropped before `finish`, the state becomes `Failed` so a
/// cancelled sync can't block later ones.
struct SyncGuard<'a> {
  engine: &'a SyncEngine,
  finished: bool,
}

impl<'a> SyncGuard<'a> {
  fn begin(engine: &'a SyncEngine) -> Option<Self> {
    let mut state = engine.lock();
    if state.sync_state.is_syncing() {
      return None;
    }
    state.sync_state = SyncState::Syncing;
    Some(Self {
      engine,
      finished: false,
    })
  }

  fn finish(mut self, result: &Result<SyncRun, SyncError>, record_last_sync: bool) {
    let mut state = self.engine.lock();
    match result {
      Ok(run) => {
        state.sync_state = SyncState::Success;
        state.failed_attempts = 0;
        if record_last_sync {
          state.last_sync = Some(run.window_end);
        }
      }
      Err(e) => {
        state.sync_state = SyncState::Failed(e.to_string());
        state.failed_attempts += 1;
      }
    }
    self.finished = true;
  }
}

impl Drop for SyncGuard<'_> {
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    let mut state = self.engine.lock();
    if state.sync_state.is_syncing() {
      warn!("sync cancelled before completion");
      state.sync_state = SyncState::Failed("sync cancelled".to_string());
      state.failed_attempts += 1;
    }
  }
}

struct RetryGuard<'a>(&'a SyncEngine);

impl Drop for RetryGuard<'_> {
  fn drop(&mut self) {
    self.0.lock().retrying = false;
  }
}

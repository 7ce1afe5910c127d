//! In-crate fakes for exercising the sync engine.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::config::SyncConfiguration;
use super::device::StaticDeviceMonitor;
use super::engine::SyncEngine;
use crate::cache::{CacheConfiguration, CacheService, NoopStorage};
use crate::clock::ManualClock;
use crate::health::{HealthDataBatch, HealthSample, MetricType, MetricValue, SampleWindow};
use crate::source::DataSource;
use crate::transport::{UploadResponse, UploadTransport};

#[derive(Default)]
pub struct FakeSource {
  samples: Mutex<HashMap<MetricType, Vec<HealthSample>>>,
  failing: Mutex<HashSet<MetricType>>,
  requests: Mutex<Vec<(MetricType, SampleWindow)>>,
  pub calls: AtomicUsize,
}

impl FakeSource {
  pub fn put(&self, metric: MetricType, samples: Vec<HealthSample>) {
    self.samples.lock().unwrap().insert(metric, samples);
  }

  pub fn fail(&self, metric: MetricType) {
    self.failing.lock().unwrap().insert(metric);
  }

  /// Windows asked for, in call order.
  pub fn requests(&self) -> Vec<(MetricType, SampleWindow)> {
    self.requests.lock().unwrap().clone()
  }
}

impl DataSource for FakeSource {
  fn fetch<'a>(
    &'a self,
    metric: MetricType,
    window: SampleWindow,
    limit: Option<usize>,
  ) -> BoxFuture<'a, Result<Vec<HealthSample>>> {
    Box::pin(async move {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.requests.lock().unwrap().push((metric, window));
      if self.failing.lock().unwrap().contains(&metric) {
        return Err(eyre!("{} unavailable", metric));
      }

      let samples = self.samples.lock().unwrap().get(&metric).cloned().unwrap_or_default();
      Ok(
        samples
          .into_iter()
          .filter(|s| window.contains(s.timestamp))
          .take(limit.unwrap_or(usize::MAX))
          .collect(),
      )
    })
  }
}

/// Records every upload and answers from a script, accepting once it runs out.
#[derive(Default)]
pub struct FakeTransport {
  script: Mutex<VecDeque<Result<UploadResponse, String>>>,
  uploads: Mutex<Vec<HealthDataBatch>>,
  gate: Option<Arc<Notify>>,
}

impl FakeTransport {
  /// Every upload waits for a notification on the gate before answering.
  pub fn gated() -> Self {
    Self {
      gate: Some(Arc::new(Notify::new())),
      ..Self::default()
    }
  }

  pub fn gate(&self) -> Option<Arc<Notify>> {
    self.gate.clone()
  }

  pub fn script(&self, responses: Vec<Result<UploadResponse, String>>) {
    self.script.lock().unwrap().extend(responses);
  }

  pub fn batches(&self) -> Vec<HealthDataBatch> {
    self.uploads.lock().unwrap().clone()
  }

  pub fn sizes(&self) -> Vec<usize> {
    self.uploads.lock().unwrap().iter().map(HealthDataBatch::len).collect()
  }
}

impl UploadTransport for FakeTransport {
  fn upload<'a>(
    &'a self,
    batch: &'a HealthDataBatch,
    _owner_id: &'a str,
  ) -> BoxFuture<'a, Result<UploadResponse>> {
    Box::pin(async move {
      if let Some(gate) = &self.gate {
        gate.notified().await;
      }

      self.uploads.lock().unwrap().push(batch.clone());
      let next = self.script.lock().unwrap().pop_front();
      match next {
        Some(Ok(response)) => Ok(response),
        Some(Err(reason)) => Err(eyre!(reason)),
        None => Ok(UploadResponse::accepted()),
      }
    })
  }
}

pub struct Harness {
  pub engine: Arc<SyncEngine>,
  pub cache: Arc<CacheService>,
  pub source: Arc<FakeSource>,
  pub transport: Arc<FakeTransport>,
  pub clock: Arc<ManualClock>,
}

pub fn harness(
  config: SyncConfiguration,
  device: StaticDeviceMonitor,
  transport: FakeTransport,
) -> Harness {
  let start = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
  let clock = Arc::new(ManualClock::new(start));
  let cache = Arc::new(CacheService::with_clock(
    CacheConfiguration {
      persist_to_disk: false,
      ..CacheConfiguration::default()
    },
    Arc::new(NoopStorage),
    clock.clone(),
  ));
  let source = Arc::new(FakeSource::default());
  let transport = Arc::new(transport);

  let engine = SyncEngine::new(
    config,
    "owner-1",
    cache.clone(),
    source.clone(),
    transport.clone(),
    Arc::new(device),
  )
  .with_clock(clock.clone());

  Harness {
    engine: Arc::new(engine),
    cache,
    source,
    transport,
    clock,
  }
}

/// `n` step samples one second apart starting at `start`, counting up from zero.
pub fn steps_at(start: DateTime<Utc>, n: usize) -> Vec<HealthSample> {
  (0..n)
    .map(|i| {
      HealthSample::new(start + Duration::seconds(i as i64), MetricValue::Steps {
        count: i as u64,
      })
    })
    .collect()
}

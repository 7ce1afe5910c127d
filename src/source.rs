//! Device-local health data sources.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::path::PathBuf;
use tracing::debug;

use crate::health::{HealthSample, MetricType, SampleWindow};

/// Supplies raw readings for a metric type over a time range.
///
/// `window` is half-open: a sample belongs to it when
/// `start < timestamp <= end`. Calls may block on the device framework and
/// may fail; the sync engine treats a failure as "skip this metric type for
/// now".
pub trait DataSource: Send + Sync {
  fn fetch<'a>(
    &'a self,
    metric: MetricType,
    window: SampleWindow,
    limit: Option<usize>,
  ) -> BoxFuture<'a, Result<Vec<HealthSample>>>;
}

/// Reads exported samples from `<dir>/<metricKey>.json`.
///
/// Each file holds a JSON array of samples. A missing file means no data.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
  dir: PathBuf,
}

impl JsonFileSource {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  async fn read_samples(
    &self,
    metric: MetricType,
    window: SampleWindow,
    limit: Option<usize>,
  ) -> Result<Vec<HealthSample>> {
    let path = self.dir.join(format!("{}.json", metric.storage_key()));

    let data = match tokio::fs::read(&path).await {
      Ok(data) => data,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(metric = %metric, path = %path.display(), "no export file");
        return Ok(Vec::new());
      }
      Err(e) => return Err(eyre!("Failed to read {}: {}", path.display(), e)),
    };

    let samples: Vec<HealthSample> = serde_json::from_slice(&data)
      .map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))?;

    let mut samples: Vec<HealthSample> = samples
      .into_iter()
      .filter(|s| s.metric_type() == metric)
      .filter(|s| window.contains(s.timestamp))
      .collect();
    samples.sort_by_key(|s| s.timestamp);

    if let Some(limit) = limit {
      samples.truncate(limit);
    }

    Ok(samples)
  }
}

impl DataSource for JsonFileSource {
  fn fetch<'a>(
    &'a self,
    metric: MetricType,
    window: SampleWindow,
    limit: Option<usize>,
  ) -> BoxFuture<'a, Result<Vec<HealthSample>>> {
    Box::pin(self.read_samples(metric, window, limit))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::health::MetricValue;
  use chrono::{DateTime, Duration, Utc};

  #[tokio::test]
  async fn test_reads_filters_and_limits() {
    let dir = tempfile::tempdir().unwrap();
    let base = "2024-03-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

    let samples = vec![
      HealthSample::new(base + Duration::hours(3), MetricValue::HeartRate { bpm: 80.0 }),
      HealthSample::new(base + Duration::hours(1), MetricValue::HeartRate { bpm: 60.0 }),
      HealthSample::new(base + Duration::hours(2), MetricValue::HeartRate { bpm: 70.0 }),
      HealthSample::new(base - Duration::hours(1), MetricValue::HeartRate { bpm: 50.0 }),
      HealthSample::new(base + Duration::hours(1), MetricValue::Steps { count: 5 }),
    ];
    std::fs::write(
      dir.path().join("heartRate.json"),
      serde_json::to_vec(&samples).unwrap(),
    )
    .unwrap();

    let source = JsonFileSource::new(dir.path());
    let window = SampleWindow::new(base, base + Duration::hours(4));

    let all = source.fetch(MetricType::HeartRate, window, None).await.unwrap();
    let bpms: Vec<MetricValue> = all.iter().map(|s| s.value.clone()).collect();
    assert_eq!(bpms, vec![
      MetricValue::HeartRate { bpm: 60.0 },
      MetricValue::HeartRate { bpm: 70.0 },
      MetricValue::HeartRate { bpm: 80.0 },
    ]);

    let limited = source.fetch(MetricType::HeartRate, window, Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
  }

  #[tokio::test]
  async fn test_window_excludes_its_start() {
    let dir = tempfile::tempdir().unwrap();
    let base = "2024-03-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
    let samples = vec![
      HealthSample::new(base, MetricValue::Steps { count: 1 }),
      HealthSample::new(base + Duration::hours(1), MetricValue::Steps { count: 2 }),
    ];
    std::fs::write(dir.path().join("steps.json"), serde_json::to_vec(&samples).unwrap()).unwrap();

    let source = JsonFileSource::new(dir.path());
    let first = SampleWindow::new(base - Duration::hours(1), base);
    let second = SampleWindow::new(base, base + Duration::hours(1));

    let a = source.fetch(MetricType::Steps, first, None).await.unwrap();
    let b = source.fetch(MetricType::Steps, second, None).await.unwrap();
    assert_eq!(a, vec![samples[0].clone()]);
    assert_eq!(b, vec![samples[1].clone()]);
  }

  #[tokio::test]
  async fn test_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonFileSource::new(dir.path());
    let now = Utc::now();
    let window = SampleWindow::new(now - Duration::days(1), now);
    let samples = source.fetch(MetricType::Sleep, window, None).await.unwrap();
    assert!(samples.is_empty());
  }

  #[tokio::test]
  async fn test_corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("steps.json"), "{not json").unwrap();
    let source = JsonFileSource::new(dir.path());
    let now = Utc::now();
    let window = SampleWindow::new(now - Duration::days(1), now);
    assert!(source.fetch(MetricType::Steps, window, None).await.is_err());
  }
}

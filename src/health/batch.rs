//! Upload batches and size-bounded splitting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{DeviceInfo, HealthSample, MetricType};

/// A single upload record: one sample with its value serialized to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
  pub metric_type: MetricType,
  pub timestamp: DateTime<Utc>,
  pub value: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub device_info: Option<DeviceInfo>,
}

impl DataPoint {
  pub fn from_sample(sample: &HealthSample) -> Result<Self, serde_json::Error> {
    Ok(Self {
      metric_type: sample.metric_type(),
      timestamp: sample.timestamp,
      value: serde_json::to_string(&sample.value)?,
      device_info: sample.device.clone(),
    })
  }
}

/// A group of data points uploaded on behalf of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDataBatch {
  pub owner_id: String,
  pub data_points: Vec<DataPoint>,
}

impl HealthDataBatch {
  pub fn new(owner_id: impl Into<String>, data_points: Vec<DataPoint>) -> Self {
    Self {
      owner_id: owner_id.into(),
      data_points,
    }
  }

  pub fn len(&self) -> usize {
    self.data_points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data_points.is_empty()
  }

  /// Split into contiguous chunks of at most `max_size` points.
  ///
  /// Order is preserved and nothing is deduplicated. A batch that already
  /// fits is handed back as-is. A `max_size` of zero is treated as one.
  pub fn split(self, max_size: usize) -> Vec<HealthDataBatch> {
    let max_size = max_size.max(1);
    if self.data_points.len() <= max_size {
      return vec![self];
    }

    let Self {
      owner_id,
      data_points,
    } = self;

    data_points
      .chunks(max_size)
      .map(|chunk| HealthDataBatch::new(owner_id.clone(), chunk.to_vec()))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::health::MetricValue;
  use chrono::Duration;

  fn batch_of(n: usize) -> HealthDataBatch {
    let base = Utc::now();
    let points = (0..n)
      .map(|i| {
        let sample = HealthSample::new(
          base + Duration::seconds(i as i64),
          MetricValue::Steps { count: i as u64 },
        );
        DataPoint::from_sample(&sample).unwrap()
      })
      .collect();
    HealthDataBatch::new("owner-1", points)
  }

  #[test]
  fn test_split_250_by_100() {
    let chunks = batch_of(250).split(100);
    let sizes: Vec<usize> = chunks.iter().map(HealthDataBatch::len).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert!(chunks.iter().all(|c| c.owner_id == "owner-1"));
  }

  #[test]
  fn test_split_concatenation_reconstructs_original() {
    for (n, m) in [(1, 1), (7, 3), (9, 3), (10, 4), (33, 100), (101, 10)] {
      let original = batch_of(n);
      let chunks = original.clone().split(m);

      assert_eq!(chunks.len(), n.div_ceil(m));
      assert!(chunks.iter().all(|c| c.len() <= m && !c.is_empty()));

      let rebuilt: Vec<DataPoint> = chunks.into_iter().flat_map(|c| c.data_points).collect();
      assert_eq!(rebuilt, original.data_points);
    }
  }

  #[test]
  fn test_split_small_batch_is_unchanged() {
    let original = batch_of(100);
    let chunks = original.clone().split(100);
    assert_eq!(chunks, vec![original]);
  }

  #[test]
  fn test_split_zero_max_size_means_one() {
    let chunks = batch_of(3).split(0);
    assert_eq!(chunks.len(), 3);
  }

  #[test]
  fn test_data_point_serializes_value() {
    let sample = HealthSample::new(Utc::now(), MetricValue::BloodPressure {
      systolic: 120.0,
      diastolic: 80.0,
    });
    let point = DataPoint::from_sample(&sample).unwrap();
    assert_eq!(point.metric_type, MetricType::BloodPressure);

    let value: serde_json::Value = serde_json::from_str(&point.value).unwrap();
    assert_eq!(value["systolic"], 120.0);
    assert_eq!(value["type"], "bloodPressure");
  }
}

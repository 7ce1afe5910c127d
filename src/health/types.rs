//! Health metric domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A named category of health measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricType {
  HeartRate,
  Steps,
  BloodPressure,
  Sleep,
}

impl MetricType {
  /// Every tracked metric type, in the fixed order syncs walk them.
  pub const ALL: [MetricType; 4] = [
    MetricType::HeartRate,
    MetricType::Steps,
    MetricType::BloodPressure,
    MetricType::Sleep,
  ];

  /// Key used for persisted documents and source files (e.g. `heartRate`).
  pub fn storage_key(&self) -> &'static str {
    match self {
      Self::HeartRate => "heartRate",
      Self::Steps => "steps",
      Self::BloodPressure => "bloodPressure",
      Self::Sleep => "sleep",
    }
  }
}

impl fmt::Display for MetricType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::HeartRate => "heart-rate",
      Self::Steps => "steps",
      Self::BloodPressure => "blood-pressure",
      Self::Sleep => "sleep",
    })
  }
}

#[derive(Debug, Error)]
#[error("unknown metric type: {0}")]
pub struct UnknownMetricType(pub String);

impl FromStr for MetricType {
  type Err = UnknownMetricType;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized: String = s
      .chars()
      .filter(|c| !matches!(c, '-' | '_' | ' '))
      .collect::<String>()
      .to_lowercase();

    match normalized.as_str() {
      "heartrate" | "hr" => Ok(Self::HeartRate),
      "steps" | "stepcount" => Ok(Self::Steps),
      "bloodpressure" | "bp" => Ok(Self::BloodPressure),
      "sleep" => Ok(Self::Sleep),
      _ => Err(UnknownMetricType(s.to_string())),
    }
  }
}

/// Sleep stage as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SleepStage {
  InBed,
  Awake,
  Core,
  Deep,
  Rem,
  Unspecified,
}

/// The measured value of one sample. The variant determines the metric type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MetricValue {
  HeartRate { bpm: f64 },
  Steps { count: u64 },
  BloodPressure { systolic: f64, diastolic: f64 },
  Sleep { stage: SleepStage, end: DateTime<Utc> },
}

impl MetricValue {
  pub fn metric_type(&self) -> MetricType {
    match self {
      Self::HeartRate { .. } => MetricType::HeartRate,
      Self::Steps { .. } => MetricType::Steps,
      Self::BloodPressure { .. } => MetricType::BloodPressure,
      Self::Sleep { .. } => MetricType::Sleep,
    }
  }
}

/// Device a sample originated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
  /// Stable identifier of the originating device
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
}

/// One raw reading supplied by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSample {
  pub timestamp: DateTime<Utc>,
  pub value: MetricValue,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub device: Option<DeviceInfo>,
}

impl HealthSample {
  pub fn new(timestamp: DateTime<Utc>, value: MetricValue) -> Self {
    Self {
      timestamp,
      value,
      device: None,
    }
  }

  pub fn with_device(mut self, device: DeviceInfo) -> Self {
    self.device = Some(device);
    self
  }

  pub fn metric_type(&self) -> MetricType {
    self.value.metric_type()
  }
}

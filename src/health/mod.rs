//! Health data model: metric types, raw samples, time windows and upload batches.

mod batch;
mod types;
mod window;

pub use batch::{DataPoint, HealthDataBatch};
pub use types::{
  DeviceInfo, HealthSample, MetricType, MetricValue, SleepStage, UnknownMetricType,
};
pub use window::SampleWindow;

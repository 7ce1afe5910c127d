//! Upload sync engine.
//!
//! A sync passes the device resource gate, pulls each tracked metric type
//! through the cache, flattens the samples into one batch, splits it into
//! upload-sized chunks and sends them in order. A failed chunk is queued
//! for [`SyncEngine::retry_failed_uploads`].

mod config;
mod device;
mod engine;
mod error;
mod scheduler;
mod state;

#[cfg(test)]
mod testing;

pub use config::{SyncConfiguration, FIRST_SYNC_LOOKBACK_DAYS, PARTIAL_SYNC_LOOKBACK_DAYS};
pub use device::{DeviceMonitor, NetworkKind, StaticDeviceMonitor};
pub use engine::{SyncEngine, SyncOutcome, SyncReport, SyncStatistics};
pub use error::{RetryOutcome, SyncError};
pub use state::SyncState;

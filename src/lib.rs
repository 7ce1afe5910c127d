//! Health metric caching and batched upload sync.

pub mod cache;
pub mod clock;
pub mod config;
pub mod health;
pub mod logging;
pub mod source;
pub mod sync;
pub mod transport;

pub use cache::{CacheConfiguration, CacheService};
pub use health::{HealthSample, MetricType, MetricValue};
pub use sync::{SyncConfiguration, SyncEngine, SyncError, SyncState};

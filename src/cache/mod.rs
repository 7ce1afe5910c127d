//! Expiring, size-bounded, throttled cache for health metrics.
//!
//! This module provides:
//! - One expiring entry sequence per metric type, trimmed expiry-first then oldest-first
//! - Keyed aggregates of any serializable type
//! - A per-metric fetch throttle
//! - Hit/miss/throttle counters
//! - A best-effort disk mirror loaded at startup

mod config;
mod entry;
mod service;
mod stats;
mod storage;
mod throttle;
mod traits;

pub use config::CacheConfiguration;
pub use entry::{CacheEntry, MetricCache};
pub use service::CacheService;
pub use stats::CacheStatistics;
pub use storage::{CacheStorage, JsonFileStorage, MemoryStorage, NoopStorage};
pub use throttle::ThrottleRegistry;
pub use traits::{CacheResult, CacheSource};

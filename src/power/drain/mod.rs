//! Drain attribution: device readings in, per-state energy totals out

pub mod capacity;
pub mod models;
pub mod sampler;
pub mod tracker;

pub use capacity::{CapacityEstimator, DEFAULT_CAPACITY_MAH};
pub use models::*;
pub use sampler::{reading_from_status, DrainSampler, PlatformBatteryStatus, ScreenEvent};
pub use tracker::{classify, diff_readings, DrainAttributionTracker, TrackerSettings, TrackerStatus};

//! Boundary to the platform battery sampler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::power::drain::capacity::CapacityEstimator;
use crate::power::drain::models::DrainReading;

/// Produces point-in-time device readings.
///
/// Implementations live outside the core (platform battery APIs, shell output). `None`
/// means no reading could be taken this cycle.
pub trait DrainSampler: Send {
    fn sample(&mut self) -> Option<DrainReading>;
}

impl<F> DrainSampler for F
where
    F: FnMut() -> Option<DrainReading> + Send,
{
    fn sample(&mut self) -> Option<DrainReading> {
        self()
    }
}

/// Screen power transition that forces an immediate reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenEvent {
    On,
    Off,
}

/// Battery status as reported by the platform, before unit normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformBatteryStatus {
    pub timestamp: DateTime<Utc>,
    pub battery_pct: f64,
    /// Remaining charge counter in µAh, when the platform exposes one
    pub charge_counter_uah: Option<i64>,
    /// Instantaneous current in µA
    pub current_now_ua: i64,
    pub screen_on: bool,
    pub charging: bool,
    pub deep_sleep: bool,
    pub dozing: bool,
    pub awake_time_ms: u64,
    pub deep_sleep_time_ms: u64,
}

/// Convert a platform status into a reading.
///
/// Without a usable charge counter the charge is derived from the battery percentage and
/// the estimator's capacity.
pub fn reading_from_status(status: &PlatformBatteryStatus, capacity: &CapacityEstimator) -> DrainReading {
    let charge_mah = match status.charge_counter_uah.filter(|c| *c > 0) {
        Some(counter) => counter as f64 / 1000.0,
        None => capacity.charge_from_percentage(status.battery_pct),
    };

    DrainReading {
        timestamp: status.timestamp,
        battery_pct: status.battery_pct,
        charge_mah,
        current_ma: status.current_now_ua as f64 / 1000.0,
        screen_on: status.screen_on,
        charging: status.charging,
        deep_sleep: status.deep_sleep,
        dozing: status.dozing,
        awake_time_ms: status.awake_time_ms,
        deep_sleep_time_ms: status.deep_sleep_time_ms,
    }
}

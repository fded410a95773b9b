//! Data models for drain attribution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Point-in-time device state captured by a sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReading {
    pub timestamp: DateTime<Utc>,
    pub battery_pct: f64,
    /// Estimated remaining charge in mAh
    pub charge_mah: f64,
    /// Instantaneous current in mA; sign convention is the sampler's
    pub current_ma: f64,
    pub screen_on: bool,
    pub charging: bool,
    pub deep_sleep: bool,
    pub dozing: bool,
    /// Cumulative CPU awake time reported by the platform
    pub awake_time_ms: u64,
    /// Cumulative deep sleep time reported by the platform
    pub deep_sleep_time_ms: u64,
}

/// Device-state bucket a single interval is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DrainBucket {
    /// Screen on, current at or above the active threshold
    ScreenOnActive,
    /// Screen on, current below the active threshold
    ScreenOnIdle,
    DeepSleep,
    /// Screen off but the CPU was not confirmed asleep
    Awake,
}

impl DrainBucket {
    pub fn is_screen_on(&self) -> bool {
        matches!(self, DrainBucket::ScreenOnActive | DrainBucket::ScreenOnIdle)
    }
}

/// Accumulated time and energy for one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BucketTotals {
    pub duration_ms: u64,
    pub energy_mah: f64,
}

impl BucketTotals {
    pub fn add(&mut self, duration_ms: u64, energy_mah: f64) {
        self.duration_ms = self.duration_ms.saturating_add(duration_ms);
        self.energy_mah += energy_mah;
    }

    /// Energy per hour; 0 when no time has been accumulated
    pub fn rate_per_hour(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        self.energy_mah / (self.duration_ms as f64 / MS_PER_HOUR)
    }
}

/// Derived drain rates in mAh per hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DrainRates {
    pub screen_on: f64,
    pub screen_off: f64,
    pub active: f64,
    pub idle: f64,
    pub deep_sleep: f64,
    pub awake: f64,
}

/// Cumulative attribution state for one tracking session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainState {
    pub session_id: Uuid,
    pub session_start: DateTime<Utc>,
    pub screen_on: BucketTotals,
    pub screen_off: BucketTotals,
    pub active: BucketTotals,
    pub idle: BucketTotals,
    pub deep_sleep: BucketTotals,
    pub awake: BucketTotals,
    pub last_reading: Option<DrainReading>,
    pub intervals_applied: u64,
    pub intervals_discarded: u64,
}

impl DrainState {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            session_start,
            screen_on: BucketTotals::default(),
            screen_off: BucketTotals::default(),
            active: BucketTotals::default(),
            idle: BucketTotals::default(),
            deep_sleep: BucketTotals::default(),
            awake: BucketTotals::default(),
            last_reading: None,
            intervals_applied: 0,
            intervals_discarded: 0,
        }
    }

    pub fn rates(&self) -> DrainRates {
        DrainRates {
            screen_on: self.screen_on.rate_per_hour(),
            screen_off: self.screen_off.rate_per_hour(),
            active: self.active.rate_per_hour(),
            idle: self.idle.rate_per_hour(),
            deep_sleep: self.deep_sleep.rate_per_hour(),
            awake: self.awake.rate_per_hour(),
        }
    }

    /// Energy drained across all buckets this session
    pub fn total_energy_mah(&self) -> f64 {
        self.screen_on.energy_mah + self.screen_off.energy_mah
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.screen_on.duration_ms.saturating_add(self.screen_off.duration_ms)
    }
}

/// Result of offering one reading to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum DiffOutcome {
    Applied {
        bucket: DrainBucket,
        duration_ms: u64,
        energy_mah: f64,
    },
    /// First reading of a session; nothing to diff against
    NoBaseline,
    /// An endpoint of the interval was charging
    Charging,
    /// Timestamps did not advance
    NonMonotonic,
    /// The tracker is not running
    Stopped,
}

impl DiffOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DiffOutcome::Applied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_per_hour() {
        let totals = BucketTotals {
            duration_ms: 1_800_000,
            energy_mah: 0.5,
        };
        assert!((totals.rate_per_hour() - 1.0).abs() < 1e-12);
        assert_eq!(BucketTotals::default().rate_per_hour(), 0.0);
    }

    #[test]
    fn test_new_state_has_unique_session() {
        let now = Utc::now();
        let a = DrainState::new(now);
        let b = DrainState::new(now);
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.total_energy_mah(), 0.0);
        assert_eq!(a.rates(), DrainRates::default());
    }
}

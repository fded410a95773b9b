//! Drain attribution state machine

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::power::drain::models::{DiffOutcome, DrainBucket, DrainReading, DrainState};
use crate::power::models::MonitorConfig;

/// Thresholds used to classify an interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    /// Screen-on current magnitude (mA) at which an interval counts as active use
    pub active_current_threshold_ma: f64,
    /// Fraction of an interval the CPU must have slept for it to count as deep sleep
    pub deep_sleep_ratio: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for TrackerSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            active_current_threshold_ma: config.active_current_threshold_ma,
            deep_sleep_ratio: config.deep_sleep_ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    #[default]
    Stopped,
    Running,
}

/// Attributes battery drain between consecutive readings to device-state buckets.
///
/// Not safe for concurrent mutation; one task owns a tracker and feeds it readings in
/// arrival order.
#[derive(Debug, Clone)]
pub struct DrainAttributionTracker {
    settings: TrackerSettings,
    status: TrackerStatus,
    state: DrainState,
}

impl DrainAttributionTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            status: TrackerStatus::Stopped,
            state: DrainState::new(Utc::now()),
        }
    }

    pub fn status(&self) -> TrackerStatus {
        self.status
    }

    pub fn state(&self) -> &DrainState {
        &self.state
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Begin a fresh session
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.reset(now);
        self.status = TrackerStatus::Running;
        info!("Drain tracking started, session {}", self.state.session_id);
    }

    /// Stop accepting readings. Accumulated totals are kept until the next start or reset.
    pub fn stop(&mut self) {
        if self.status == TrackerStatus::Running {
            info!("Drain tracking stopped, session {}", self.state.session_id);
        }
        self.status = TrackerStatus::Stopped;
    }

    /// Zero every bucket and forget the reading history
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = DrainState::new(now);
    }

    /// Diff `reading` against the previous one and update the buckets.
    ///
    /// The reading always becomes the new baseline while running, whether or not the
    /// interval it closes was applied.
    pub fn offer(&mut self, reading: DrainReading) -> DiffOutcome {
        if self.status != TrackerStatus::Running {
            return DiffOutcome::Stopped;
        }

        let outcome = match self.state.last_reading.as_ref() {
            None => DiffOutcome::NoBaseline,
            Some(prev) => diff_readings(prev, &reading, &self.settings),
        };

        match outcome {
            DiffOutcome::Applied {
                bucket,
                duration_ms,
                energy_mah,
            } => {
                self.apply(bucket, duration_ms, energy_mah);
                self.state.intervals_applied += 1;
            }
            DiffOutcome::Charging | DiffOutcome::NonMonotonic => {
                debug!("Discarded drain interval: {:?}", outcome);
                self.state.intervals_discarded += 1;
            }
            DiffOutcome::NoBaseline | DiffOutcome::Stopped => {}
        }

        self.state.last_reading = Some(reading);
        outcome
    }

    fn apply(&mut self, bucket: DrainBucket, duration_ms: u64, energy_mah: f64) {
        let state = &mut self.state;
        match bucket {
            DrainBucket::ScreenOnActive => {
                state.screen_on.add(duration_ms, energy_mah);
                state.active.add(duration_ms, energy_mah);
            }
            DrainBucket::ScreenOnIdle => {
                state.screen_on.add(duration_ms, energy_mah);
                state.idle.add(duration_ms, energy_mah);
            }
            DrainBucket::DeepSleep => {
                state.screen_off.add(duration_ms, energy_mah);
                state.deep_sleep.add(duration_ms, energy_mah);
            }
            DrainBucket::Awake => {
                state.screen_off.add(duration_ms, energy_mah);
                state.awake.add(duration_ms, energy_mah);
            }
        }
    }
}

impl Default for DrainAttributionTracker {
    fn default() -> Self {
        Self::new(TrackerSettings::default())
    }
}

/// Compute the attribution for the interval `prev -> cur` without touching any state
pub fn diff_readings(prev: &DrainReading, cur: &DrainReading, settings: &TrackerSettings) -> DiffOutcome {
    // Current polarity while charging is not comparable to discharge current
    if prev.charging || cur.charging {
        return DiffOutcome::Charging;
    }

    let elapsed_ms = (cur.timestamp - prev.timestamp).num_milliseconds();
    if elapsed_ms <= 0 {
        return DiffOutcome::NonMonotonic;
    }
    let duration_ms = elapsed_ms as u64;

    let energy_mah = (prev.charge_mah - cur.charge_mah).max(0.0);

    DiffOutcome::Applied {
        bucket: classify(prev, cur, duration_ms, settings),
        duration_ms,
        energy_mah,
    }
}

/// Bucket for an interval ending at `cur`
pub fn classify(prev: &DrainReading, cur: &DrainReading, duration_ms: u64, settings: &TrackerSettings) -> DrainBucket {
    if cur.screen_on {
        return if cur.current_ma.abs() >= settings.active_current_threshold_ma {
            DrainBucket::ScreenOnActive
        } else {
            DrainBucket::ScreenOnIdle
        };
    }

    if !cur.dozing && slept_through(prev, cur, duration_ms, settings) {
        DrainBucket::DeepSleep
    } else {
        DrainBucket::Awake
    }
}

/// Whether the platform reports enough sleep over the interval.
///
/// Uses the cumulative sleep counter when it advanced; otherwise the reading's flag.
fn slept_through(prev: &DrainReading, cur: &DrainReading, duration_ms: u64, settings: &TrackerSettings) -> bool {
    let slept_ms = cur.deep_sleep_time_ms.saturating_sub(prev.deep_sleep_time_ms);
    if slept_ms == 0 || duration_ms == 0 {
        return cur.deep_sleep;
    }

    slept_ms as f64 / duration_ms as f64 >= settings.deep_sleep_ratio
}

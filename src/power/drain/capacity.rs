//! Battery capacity estimation for percentage-to-charge conversion

use log::info;

use crate::power::models::{MonitorConfig, PowerSnapshot};

/// Design capacity assumed when nothing better is known
pub const DEFAULT_CAPACITY_MAH: f64 = 3000.0;

/// Tracks the best known design capacity.
///
/// A capacity decoded from a checkin dump overrides the configured default.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityEstimator {
    default_mah: f64,
    decoded_mah: Option<f64>,
}

impl CapacityEstimator {
    pub fn new(default_mah: f64) -> Self {
        let default_mah = if default_mah > 0.0 { default_mah } else { DEFAULT_CAPACITY_MAH };
        Self {
            default_mah,
            decoded_mah: None,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.default_capacity_mah)
    }

    /// Adopt the snapshot's estimated capacity, if it has one
    pub fn apply_snapshot(&mut self, snapshot: &PowerSnapshot) {
        if let Some(capacity) = snapshot.estimated_capacity_mah.filter(|c| *c > 0.0) {
            if self.decoded_mah != Some(capacity) {
                info!("Using decoded battery capacity {:.0} mAh", capacity);
            }
            self.decoded_mah = Some(capacity);
        }
    }

    pub fn capacity_mah(&self) -> f64 {
        self.decoded_mah.unwrap_or(self.default_mah)
    }

    /// Remaining charge implied by a battery percentage
    pub fn charge_from_percentage(&self, battery_pct: f64) -> f64 {
        self.capacity_mah() * battery_pct.clamp(0.0, 100.0) / 100.0
    }
}

impl Default for CapacityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_MAH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity_until_snapshot_applied() {
        let mut estimator = CapacityEstimator::default();
        assert_eq!(estimator.charge_from_percentage(50.0), 1500.0);

        let snapshot = PowerSnapshot {
            estimated_capacity_mah: Some(4000.0),
            ..Default::default()
        };
        estimator.apply_snapshot(&snapshot);
        assert_eq!(estimator.capacity_mah(), 4000.0);
        assert_eq!(estimator.charge_from_percentage(25.0), 1000.0);
    }

    #[test]
    fn test_empty_snapshot_keeps_previous_capacity() {
        let mut estimator = CapacityEstimator::new(3500.0);
        estimator.apply_snapshot(&PowerSnapshot {
            estimated_capacity_mah: Some(4200.0),
            ..Default::default()
        });
        estimator.apply_snapshot(&PowerSnapshot::default());
        assert_eq!(estimator.capacity_mah(), 4200.0);
    }

    #[test]
    fn test_invalid_default_and_percentage_are_clamped() {
        let estimator = CapacityEstimator::new(-1.0);
        assert_eq!(estimator.capacity_mah(), DEFAULT_CAPACITY_MAH);
        assert_eq!(estimator.charge_from_percentage(150.0), DEFAULT_CAPACITY_MAH);
        assert_eq!(estimator.charge_from_percentage(-3.0), 0.0);
    }
}

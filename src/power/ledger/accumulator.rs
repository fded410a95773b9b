//! Incremental per-app energy accumulation across checkin polls

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::models::{EnergyDelta, LedgerKey};
use super::storage::EnergyLedger;
use crate::power::models::{MonitorConfig, PowerSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorSettings {
    /// Deltas smaller than this are treated as counter noise
    pub noise_floor: f64,
    /// Mode tag written with every ledger row
    pub mode: String,
}

impl Default for AccumulatorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for AccumulatorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            noise_floor: config.ledger_noise_floor,
            mode: config.ledger_mode.clone(),
        }
    }
}

/// Outcome of one accumulation cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulateReport {
    /// No baseline existed, so nothing was diffed
    pub warm_up: bool,
    pub applied: usize,
    pub failed: usize,
    pub energy_mah: f64,
}

/// Turns successive cumulative per-app energy totals into ledger increments
#[derive(Debug, Clone, Default)]
pub struct IncrementalEnergyAccumulator {
    settings: AccumulatorSettings,
    previous: Option<HashMap<String, f64>>,
}

impl IncrementalEnergyAccumulator {
    pub fn new(settings: AccumulatorSettings) -> Self {
        Self {
            settings,
            previous: None,
        }
    }

    /// Forget the baseline; the next poll is a warm-up
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    /// Diff `snapshot` against the baseline, then make it the new baseline.
    ///
    /// Only identifiers present in both polls produce deltas. Returns nothing on warm-up.
    pub fn compute_deltas(&mut self, snapshot: &PowerSnapshot) -> Vec<EnergyDelta> {
        let current = snapshot.energy_by_name();
        let previous = match self.previous.replace(current.clone()) {
            Some(previous) => previous,
            None => return Vec::new(),
        };

        let mut deltas: Vec<EnergyDelta> = current
            .iter()
            .filter_map(|(identifier, energy)| {
                let before = previous.get(identifier)?;
                let delta = (energy - before).max(0.0);
                // Zero deltas never reach the ledger, whatever the configured floor
                (delta > 0.0 && delta >= self.settings.noise_floor).then(|| EnergyDelta {
                    identifier: identifier.clone(),
                    energy_mah: delta,
                })
            })
            .collect();

        deltas.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        deltas
    }

    /// Compute deltas and upsert them into the ledger's bucket for `now`.
    ///
    /// The baseline advances even when ledger writes fail.
    pub fn accumulate(
        &mut self,
        snapshot: &PowerSnapshot,
        now: DateTime<Utc>,
        ledger: &mut dyn EnergyLedger,
    ) -> AccumulateReport {
        let warm_up = !self.has_baseline();
        let deltas = self.compute_deltas(snapshot);

        let mut report = AccumulateReport {
            warm_up,
            ..Default::default()
        };

        if warm_up {
            info!("Energy accumulator baseline set from {} apps", snapshot.apps.len());
            return report;
        }

        for delta in &deltas {
            let key = LedgerKey::new(now, delta.identifier.clone(), self.settings.mode.clone());
            match ledger.upsert(&key, delta.energy_mah, 1) {
                Ok(()) => {
                    report.applied += 1;
                    report.energy_mah += delta.energy_mah;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to record energy for {}: {}", delta.identifier, e);
                }
            }
        }

        debug!(
            "Energy poll applied {} deltas ({:.4} mAh), {} failed",
            report.applied, report.energy_mah, report.failed
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::ledger::storage::{LedgerError, MemoryLedger};
    use crate::power::ledger::models::LedgerEntry;
    use crate::power::models::AppPowerUse;
    use chrono::TimeZone;

    fn snapshot(apps: &[(&str, f64)]) -> PowerSnapshot {
        PowerSnapshot {
            apps: apps
                .iter()
                .enumerate()
                .map(|(i, (name, energy))| AppPowerUse {
                    owner_id: 10_000 + i as u32,
                    name: name.to_string(),
                    energy_mah: *energy,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, minute, 0).unwrap()
    }

    struct FailingLedger;

    impl EnergyLedger for FailingLedger {
        fn upsert(&mut self, _: &LedgerKey, _: f64, _: u32) -> Result<(), LedgerError> {
            Err(LedgerError::Lock)
        }

        fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_first_poll_is_warm_up() {
        let mut accumulator = IncrementalEnergyAccumulator::default();
        let mut ledger = MemoryLedger::new();

        let report = accumulator.accumulate(&snapshot(&[("mail", 5.0), ("maps", 9.0)]), at(0), &mut ledger);
        assert!(report.warm_up);
        assert_eq!(report.applied, 0);
        assert!(ledger.is_empty());
        assert!(accumulator.has_baseline());
    }

    #[test]
    fn test_noise_floor_suppresses_tiny_deltas() {
        let mut accumulator = IncrementalEnergyAccumulator::default();
        accumulator.compute_deltas(&snapshot(&[("mail", 5.0)]));
        assert!(accumulator.compute_deltas(&snapshot(&[("mail", 5.00005)])).is_empty());

        let mut accumulator = IncrementalEnergyAccumulator::default();
        accumulator.compute_deltas(&snapshot(&[("mail", 5.0)]));
        let deltas = accumulator.compute_deltas(&snapshot(&[("mail", 5.0002)]));
        assert_eq!(deltas.len(), 1);
        assert!((deltas[0].energy_mah - 0.0002).abs() < 1e-9);
    }

    #[test]
    fn test_zero_noise_floor_still_skips_unchanged_totals() {
        let mut accumulator = IncrementalEnergyAccumulator::new(AccumulatorSettings {
            noise_floor: 0.0,
            mode: "checkin".to_string(),
        });
        let mut ledger = MemoryLedger::new();

        accumulator.accumulate(&snapshot(&[("mail", 5.0)]), at(0), &mut ledger);
        let unchanged = accumulator.accumulate(&snapshot(&[("mail", 5.0)]), at(1), &mut ledger);
        let decreased = accumulator.accumulate(&snapshot(&[("mail", 4.0)]), at(2), &mut ledger);

        assert_eq!(unchanged.applied, 0);
        assert_eq!(decreased.applied, 0);
        assert!(ledger.is_empty());

        let report = accumulator.accumulate(&snapshot(&[("mail", 4.00001)]), at(3), &mut ledger);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn test_decreases_and_new_identifiers_produce_nothing() {
        let mut accumulator = IncrementalEnergyAccumulator::default();
        accumulator.compute_deltas(&snapshot(&[("mail", 5.0)]));

        let deltas = accumulator.compute_deltas(&snapshot(&[("mail", 1.0), ("new", 3.0)]));
        assert!(deltas.is_empty());

        // The decreased value is the new baseline
        let deltas = accumulator.compute_deltas(&snapshot(&[("mail", 1.5), ("new", 3.5)]));
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].identifier, "mail");
        assert!((deltas[0].energy_mah - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_deltas_upsert_into_hour_bucket() {
        let mut accumulator = IncrementalEnergyAccumulator::default();
        let mut ledger = MemoryLedger::new();

        accumulator.accumulate(&snapshot(&[("mail", 1.0)]), at(0), &mut ledger);
        accumulator.accumulate(&snapshot(&[("mail", 2.0)]), at(10), &mut ledger);
        let report = accumulator.accumulate(&snapshot(&[("mail", 2.5)]), at(20), &mut ledger);

        assert_eq!(report.applied, 1);
        let entry = ledger.get(&LedgerKey::new(at(0), "mail", "checkin")).unwrap();
        assert!((entry.energy_mah - 1.5).abs() < 1e-9);
        assert_eq!(entry.sample_count, 2);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_baseline_advances_when_ledger_fails() {
        let mut accumulator = IncrementalEnergyAccumulator::default();
        let mut failing = FailingLedger;

        accumulator.accumulate(&snapshot(&[("mail", 1.0)]), at(0), &mut failing);
        let report = accumulator.accumulate(&snapshot(&[("mail", 2.0)]), at(1), &mut failing);
        assert_eq!(report.failed, 1);

        let mut ledger = MemoryLedger::new();
        accumulator.accumulate(&snapshot(&[("mail", 2.25)]), at(2), &mut ledger);
        let entry = ledger.get(&LedgerKey::new(at(2), "mail", "checkin")).unwrap();
        assert!((entry.energy_mah - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restarts_warm_up() {
        let mut accumulator = IncrementalEnergyAccumulator::default();
        let mut ledger = MemoryLedger::new();
        accumulator.accumulate(&snapshot(&[("mail", 1.0)]), at(0), &mut ledger);

        accumulator.reset();
        let report = accumulator.accumulate(&snapshot(&[("mail", 9.0)]), at(1), &mut ledger);
        assert!(report.warm_up);
        assert!(ledger.is_empty());
    }
}

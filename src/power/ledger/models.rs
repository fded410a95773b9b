//! Data models for the hourly energy ledger

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

/// Identity of one ledger row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerKey {
    pub bucket_start: DateTime<Utc>,
    pub identifier: String,
    pub mode: String,
}

impl LedgerKey {
    pub fn new(at: DateTime<Utc>, identifier: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            bucket_start: hour_bucket(at),
            identifier: identifier.into(),
            mode: mode.into(),
        }
    }
}

/// Cumulative energy recorded for one key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub key: LedgerKey,
    pub energy_mah: f64,
    pub sample_count: u32,
}

/// Positive energy change for one identifier between two polls
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyDelta {
    pub identifier: String,
    pub energy_mah: f64,
}

/// Start of the hour containing `at`
pub fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(at.hour(), 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hour_bucket_truncates() {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 17, 42, 9).unwrap();
        assert_eq!(hour_bucket(at), Utc.with_ymd_and_hms(2026, 5, 4, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_keys_in_same_hour_are_equal() {
        let a = LedgerKey::new(Utc.with_ymd_and_hms(2026, 5, 4, 17, 1, 0).unwrap(), "app", "checkin");
        let b = LedgerKey::new(Utc.with_ymd_and_hms(2026, 5, 4, 17, 59, 59).unwrap(), "app", "checkin");
        assert_eq!(a, b);
    }
}

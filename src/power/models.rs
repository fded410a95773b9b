//! Data models for decoded battery statistics

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Energy attributed to one owner, merged across all of its power-use items
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppPowerUse {
    pub owner_id: u32,
    pub name: String,
    pub energy_mah: f64,
}

/// Partial wakelock usage for one named wakelock
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WakelockStats {
    pub owner_id: u32,
    pub app_name: String,
    pub name: String,
    pub partial_time_ms: u64,
    pub partial_count: u64,
    pub background_time_ms: u64,
    pub background_count: u64,
}

/// Kernel-level wakelock (no owner)
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct KernelWakelockStats {
    pub name: String,
    pub time_ms: u64,
    pub count: u64,
}

/// Wakeup alarm counts
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlarmStats {
    pub owner_id: u32,
    pub app_name: String,
    pub name: String,
    pub count: u64,
}

/// Timed, counted activity attributed to an owner (scheduled jobs and syncs share this shape)
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimedActivityStats {
    pub owner_id: u32,
    pub app_name: String,
    pub name: String,
    pub time_ms: u64,
    pub count: u64,
}

/// Per-owner network traffic
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub owner_id: u32,
    pub app_name: String,
    pub mobile_rx_bytes: u64,
    pub mobile_tx_bytes: u64,
    pub wifi_rx_bytes: u64,
    pub wifi_tx_bytes: u64,
    pub mobile_rx_packets: u64,
    pub mobile_tx_packets: u64,
    pub wifi_rx_packets: u64,
    pub wifi_tx_packets: u64,
}

impl NetworkStats {
    pub fn total_bytes(&self) -> u64 {
        self.mobile_rx_bytes
            .saturating_add(self.mobile_tx_bytes)
            .saturating_add(self.wifi_rx_bytes)
            .saturating_add(self.wifi_tx_bytes)
    }
}

/// Sensor usage by an owner
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SensorStats {
    pub owner_id: u32,
    pub app_name: String,
    pub handle: i32,
    pub time_ms: u64,
    pub count: u64,
}

/// Which radio a signal histogram describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Cellular,
    Wifi,
}

/// Time spent at each of the five signal strength levels
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalHistogram {
    pub kind: SignalKind,
    pub durations_ms: [u64; 5],
    /// Fractions of the histogram's own total, in 0.0..=1.0
    pub percentages: [f64; 5],
}

/// Bluetooth controller activity
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothStats {
    pub owner_id: u32,
    pub app_name: String,
    pub idle_ms: u64,
    pub rx_ms: u64,
    pub tx_ms: u64,
    pub energy: f64,
}

/// Doze (device idle) counters
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DozeStats {
    pub deep_idle_count: u64,
    pub deep_idle_ms: u64,
    pub light_idle_count: u64,
    pub light_idle_ms: u64,
    pub deep_idling_count: u64,
    pub deep_idling_ms: u64,
    pub light_idling_count: u64,
    pub light_idling_ms: u64,
    pub maintenance_count: u64,
    pub maintenance_ms: u64,
    /// Deep plus light idle time
    pub total_idle_ms: u64,
}

/// CPU time of a single process belonging to an owner
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCpuStats {
    pub owner_id: u32,
    pub app_name: String,
    pub process_name: String,
    pub user_ms: u64,
    pub system_ms: u64,
    pub foreground_ms: u64,
    pub starts: u64,
}

impl ProcessCpuStats {
    pub fn cpu_ms(&self) -> u64 {
        self.user_ms.saturating_add(self.system_ms)
    }
}

/// Aggregate CPU time of an owner
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppCpuStats {
    pub owner_id: u32,
    pub app_name: String,
    pub user_ms: u64,
    pub system_ms: u64,
}

impl AppCpuStats {
    pub fn cpu_ms(&self) -> u64 {
        self.user_ms.saturating_add(self.system_ms)
    }
}

/// Platform power summary
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PowerSummary {
    pub battery_capacity_mah: f64,
    pub computed_power_mah: f64,
    pub min_drained_power_mah: f64,
    pub max_drained_power_mah: f64,
}

/// Complete decoded statistics from one checkin dump
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PowerSnapshot {
    pub apps: Vec<AppPowerUse>,
    pub wakelocks: Vec<WakelockStats>,
    pub kernel_wakelocks: Vec<KernelWakelockStats>,
    pub alarms: Vec<AlarmStats>,
    pub jobs: Vec<TimedActivityStats>,
    pub syncs: Vec<TimedActivityStats>,
    pub network: Vec<NetworkStats>,
    pub sensors: Vec<SensorStats>,
    pub signal_strength: Vec<SignalHistogram>,
    pub wifi_signal: Vec<SignalHistogram>,
    pub bluetooth: Vec<BluetoothStats>,
    pub doze: Vec<DozeStats>,
    pub processes: Vec<ProcessCpuStats>,
    pub app_cpu: Vec<AppCpuStats>,
    /// Available CPU frequencies in kHz
    pub cpu_frequencies_khz: Vec<u64>,
    pub power_summary: Option<PowerSummary>,
    pub time_on_battery_ms: u64,
    pub screen_on_time_ms: u64,
    pub discharge_screen_on_pct: f64,
    pub discharge_screen_off_pct: f64,
    pub estimated_capacity_mah: Option<f64>,
}

impl PowerSnapshot {
    /// Whether no record of any family was decoded
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Total energy across all owners
    pub fn total_app_energy_mah(&self) -> f64 {
        self.apps.iter().map(|a| a.energy_mah).sum()
    }

    /// Cumulative energy per owner display name
    pub fn energy_by_name(&self) -> HashMap<String, f64> {
        let mut map = HashMap::with_capacity(self.apps.len());
        for app in &self.apps {
            *map.entry(app.name.clone()).or_insert(0.0) += app.energy_mah;
        }
        map
    }
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_active_current_threshold")]
    pub active_current_threshold_ma: f64,
    #[serde(default = "default_deep_sleep_ratio")]
    pub deep_sleep_ratio: f64,
    #[serde(default = "default_capacity")]
    pub default_capacity_mah: f64,
    #[serde(default = "default_noise_floor")]
    pub ledger_noise_floor: f64,
    #[serde(default = "default_ledger_mode")]
    pub ledger_mode: String,
    #[serde(default)]
    pub ledger_path: Option<String>,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_active_current_threshold() -> f64 {
    200.0
}

fn default_deep_sleep_ratio() -> f64 {
    0.5
}

fn default_capacity() -> f64 {
    3000.0
}

fn default_noise_floor() -> f64 {
    0.0001
}

fn default_ledger_mode() -> String {
    "checkin".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            active_current_threshold_ma: default_active_current_threshold(),
            deep_sleep_ratio: default_deep_sleep_ratio(),
            default_capacity_mah: default_capacity(),
            ledger_noise_floor: default_noise_floor(),
            ledger_mode: default_ledger_mode(),
            ledger_path: None,
        }
    }
}

//! Statistics aggregation over a checkin dump

use std::collections::BTreeMap;

use log::debug;

use crate::power::models::{
    AlarmStats, AppCpuStats, AppPowerUse, BluetoothStats, DozeStats, KernelWakelockStats,
    NetworkStats, PowerSnapshot, PowerSummary, ProcessCpuStats, SensorStats, SignalHistogram,
    SignalKind, TimedActivityStats, WakelockStats,
};
use crate::power::reader::{decode_record, find_marker_value, IdentifierRegistry, Record, RecordCategory};

/// Power-use item subtype that attributes energy to an owner id
const PER_OWNER_SUBTYPE: &str = "uid";

/// Foreground partial wakelock marker
const PARTIAL_MARKER: &str = "p";
/// Background partial wakelock marker
const BACKGROUND_PARTIAL_MARKER: &str = "bp";

/// First field after the wakelock name; marker scanning starts here
const WAKELOCK_VALUES_START: usize = 5;

const HISTOGRAM_LEVELS: usize = 5;

/// Counters for one decode pass, logged when the pass finishes
#[derive(Debug, Default, Clone, Copy)]
struct DecodeCounters {
    lines: usize,
    rejected: usize,
    dropped: usize,
    unrecognized: usize,
}

/// Builds a [`PowerSnapshot`] from checkin lines.
///
/// Lines are consumed in order; identifier mappings only apply to records that follow them.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    registry: IdentifierRegistry,
    apps: BTreeMap<u32, AppPowerUse>,
    snapshot: PowerSnapshot,
    summary_capacity: Option<f64>,
    timing_capacity: Option<f64>,
    counters: DecodeCounters,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed every line of a dump
    pub fn feed_text(&mut self, text: &str) {
        for line in text.lines() {
            self.feed_line(line);
        }
    }

    /// Decode and route a single line
    pub fn feed_line(&mut self, line: &str) {
        self.counters.lines += 1;

        let record = match decode_record(line) {
            Some(r) => r,
            None => {
                self.counters.rejected += 1;
                return;
            }
        };

        // Route on (category, tag); each handler reports whether the record was usable
        let handled = match (record.category(), record.type_tag()) {
            (RecordCategory::Info, "uid") => self.record_mapping(&record),
            (RecordCategory::LineItem, "pwi") => self.merge_power_use(&record),
            (RecordCategory::LineItem, "wl") => self.push(&record, parse_wakelock, |s| &mut s.wakelocks),
            (RecordCategory::LineItem, "kwl") => {
                self.push(&record, |r, _| parse_kernel_wakelock(r), |s| &mut s.kernel_wakelocks)
            }
            (RecordCategory::LineItem, "wua") => self.push(&record, parse_alarm, |s| &mut s.alarms),
            (RecordCategory::LineItem, "jb") => self.push(&record, parse_timed_activity, |s| &mut s.jobs),
            (RecordCategory::LineItem, "sy") => self.push(&record, parse_timed_activity, |s| &mut s.syncs),
            (RecordCategory::LineItem, "nt") => self.push(&record, parse_network, |s| &mut s.network),
            (RecordCategory::LineItem, "sr") => self.push(&record, parse_sensor, |s| &mut s.sensors),
            (RecordCategory::LineItem, "sgt") => self.push(
                &record,
                |r, _| parse_histogram(r, SignalKind::Cellular),
                |s| &mut s.signal_strength,
            ),
            (RecordCategory::LineItem, "wsgt") => self.push(
                &record,
                |r, _| parse_histogram(r, SignalKind::Wifi),
                |s| &mut s.wifi_signal,
            ),
            (RecordCategory::LineItem, "ble") => self.push(&record, parse_bluetooth, |s| &mut s.bluetooth),
            (RecordCategory::LineItem, "di") => self.push(&record, |r, _| Some(parse_doze(r)), |s| &mut s.doze),
            (RecordCategory::LineItem, "pr") => self.push(&record, parse_process, |s| &mut s.processes),
            (RecordCategory::LineItem, "cpu") => self.push(&record, parse_app_cpu, |s| &mut s.app_cpu),
            // Device-wide scalars below overwrite, so the last record of a tag wins
            (RecordCategory::LineItem, "gcf") => {
                self.snapshot.cpu_frequencies_khz = parse_cpu_frequencies(&record);
                true
            }
            (RecordCategory::LineItem, "dc") => {
                self.snapshot.discharge_screen_on_pct = record.f64_at(4);
                self.snapshot.discharge_screen_off_pct = record.f64_at(5);
                true
            }
            (RecordCategory::LineItem, "bt") => {
                self.snapshot.time_on_battery_ms = record.u64_at(5);
                let capacity = record.f64_at(12);
                if capacity > 0.0 {
                    self.timing_capacity = Some(capacity);
                }
                true
            }
            (RecordCategory::LineItem, "m") => {
                self.snapshot.screen_on_time_ms = record.u64_at(4);
                true
            }
            (RecordCategory::LineItem, "pws") => {
                let summary = parse_power_summary(&record);
                if summary.battery_capacity_mah > 0.0 {
                    self.summary_capacity = Some(summary.battery_capacity_mah);
                }
                self.snapshot.power_summary = Some(summary);
                true
            }
            // Tags from newer platform versions
            _ => {
                self.counters.unrecognized += 1;
                return;
            }
        };

        if !handled {
            self.counters.dropped += 1;
            debug!("Dropped malformed {} record: {}", record.type_tag(), line.trim());
        }
    }

    /// Sort every family and return the finished snapshot
    pub fn finish(self) -> PowerSnapshot {
        let SnapshotBuilder {
            apps,
            mut snapshot,
            summary_capacity,
            timing_capacity,
            counters,
            registry,
        } = self;

        snapshot.apps = apps.into_values().collect();
        // Power summary capacity is measured; battery timing is the fallback
        snapshot.estimated_capacity_mah = summary_capacity.or(timing_capacity);
        sort_families(&mut snapshot);

        debug!(
            "Decoded {} lines: {} names, {} apps, {} rejected, {} dropped, {} unrecognized",
            counters.lines,
            registry.len(),
            snapshot.apps.len(),
            counters.rejected,
            counters.dropped,
            counters.unrecognized
        );

        snapshot
    }

    fn record_mapping(&mut self, record: &Record<'_>) -> bool {
        let id = record.text(4).and_then(|f| f.parse::<u32>().ok());
        match (id, record.text(5)) {
            (Some(id), Some(name)) => {
                self.registry.record_mapping(id, name);
                true
            }
            _ => false,
        }
    }

    fn merge_power_use(&mut self, record: &Record<'_>) -> bool {
        let owner_id = match record.owner_id() {
            Some(id) => id,
            None => return false,
        };
        if record.text(4) != Some(PER_OWNER_SUBTYPE) {
            // Screen, radio and other hardware items are not attributed to an owner
            return true;
        }

        let energy = record.f64_at(5);
        let name = self.registry.resolve(owner_id);
        let entry = self.apps.entry(owner_id).or_insert_with(|| AppPowerUse {
            owner_id,
            name: String::new(),
            energy_mah: 0.0,
        });
        // The merged entry carries the latest resolution, so a mapping seen between two
        // items for the same owner names the whole entry
        entry.name = name;
        entry.energy_mah += energy;
        true
    }

    fn push<T>(
        &mut self,
        record: &Record<'_>,
        parse: impl FnOnce(&Record<'_>, &IdentifierRegistry) -> Option<T>,
        family: impl FnOnce(&mut PowerSnapshot) -> &mut Vec<T>,
    ) -> bool {
        match parse(record, &self.registry) {
            Some(entry) => {
                family(&mut self.snapshot).push(entry);
                true
            }
            None => false,
        }
    }
}

/// Decode a complete dump. Absent input yields an empty snapshot.
pub fn build_snapshot(text: Option<&str>) -> PowerSnapshot {
    let mut builder = SnapshotBuilder::new();
    if let Some(text) = text {
        builder.feed_text(text);
    }
    builder.finish()
}

fn owner(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<(u32, String)> {
    let id = record.owner_id()?;
    Some((id, registry.resolve(id)))
}

fn parse_wakelock(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<WakelockStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    let name = record.text(4)?;
    let partial = find_marker_value(record.fields(), WAKELOCK_VALUES_START, PARTIAL_MARKER);
    let background = find_marker_value(record.fields(), WAKELOCK_VALUES_START, BACKGROUND_PARTIAL_MARKER);

    Some(WakelockStats {
        owner_id,
        app_name,
        name: name.to_string(),
        partial_time_ms: partial.preceding,
        partial_count: partial.following,
        background_time_ms: background.preceding,
        background_count: background.following,
    })
}

fn parse_kernel_wakelock(record: &Record<'_>) -> Option<KernelWakelockStats> {
    Some(KernelWakelockStats {
        name: record.text(4)?.to_string(),
        time_ms: record.u64_at(5),
        count: record.u64_at(6),
    })
}

fn parse_alarm(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<AlarmStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    Some(AlarmStats {
        owner_id,
        app_name,
        name: record.text(4)?.to_string(),
        count: record.u64_at(5),
    })
}

fn parse_timed_activity(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<TimedActivityStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    Some(TimedActivityStats {
        owner_id,
        app_name,
        name: record.text(4)?.to_string(),
        time_ms: record.u64_at(5),
        count: record.u64_at(6),
    })
}

fn parse_network(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<NetworkStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    Some(NetworkStats {
        owner_id,
        app_name,
        mobile_rx_bytes: record.u64_at(4),
        mobile_tx_bytes: record.u64_at(5),
        wifi_rx_bytes: record.u64_at(6),
        wifi_tx_bytes: record.u64_at(7),
        mobile_rx_packets: record.u64_at(8),
        mobile_tx_packets: record.u64_at(9),
        wifi_rx_packets: record.u64_at(10),
        wifi_tx_packets: record.u64_at(11),
    })
}

fn parse_sensor(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<SensorStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    let handle = record.text(4)?.parse::<i32>().ok()?;
    Some(SensorStats {
        owner_id,
        app_name,
        handle,
        time_ms: record.u64_at(5),
        count: record.u64_at(6),
    })
}

/// Normalize five level durations into fractions of their own sum
pub fn normalize_histogram(durations: &[u64; HISTOGRAM_LEVELS]) -> [f64; HISTOGRAM_LEVELS] {
    let total = durations.iter().copied().fold(0u64, u64::saturating_add).max(1) as f64;
    durations.map(|d| d as f64 / total)
}

fn parse_histogram(record: &Record<'_>, kind: SignalKind) -> Option<SignalHistogram> {
    if record.len() < 4 + HISTOGRAM_LEVELS {
        return None;
    }

    let durations_ms: [u64; HISTOGRAM_LEVELS] = std::array::from_fn(|level| record.u64_at(4 + level));
    Some(SignalHistogram {
        kind,
        percentages: normalize_histogram(&durations_ms),
        durations_ms,
    })
}

fn parse_bluetooth(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<BluetoothStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    Some(BluetoothStats {
        owner_id,
        app_name,
        idle_ms: record.u64_at(4),
        rx_ms: record.u64_at(5),
        tx_ms: record.u64_at(6),
        energy: record.f64_at(7),
    })
}

fn parse_doze(record: &Record<'_>) -> DozeStats {
    let deep_idle_ms = record.u64_at(5);
    let light_idle_ms = record.u64_at(7);

    DozeStats {
        deep_idle_count: record.u64_at(4),
        deep_idle_ms,
        light_idle_count: record.u64_at(6),
        light_idle_ms,
        deep_idling_count: record.u64_at(8),
        deep_idling_ms: record.u64_at(9),
        light_idling_count: record.u64_at(10),
        light_idling_ms: record.u64_at(11),
        maintenance_count: record.u64_at(12),
        maintenance_ms: record.u64_at(13),
        total_idle_ms: deep_idle_ms.saturating_add(light_idle_ms),
    }
}

fn parse_process(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<ProcessCpuStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    Some(ProcessCpuStats {
        owner_id,
        app_name,
        process_name: record.text(4)?.to_string(),
        user_ms: record.u64_at(5),
        system_ms: record.u64_at(6),
        foreground_ms: record.u64_at(7),
        starts: record.u64_at(8),
    })
}

fn parse_app_cpu(record: &Record<'_>, registry: &IdentifierRegistry) -> Option<AppCpuStats> {
    let (owner_id, app_name) = owner(record, registry)?;
    Some(AppCpuStats {
        owner_id,
        app_name,
        user_ms: record.u64_at(4),
        system_ms: record.u64_at(5),
    })
}

fn parse_cpu_frequencies(record: &Record<'_>) -> Vec<u64> {
    (4..record.len())
        .map(|i| record.u64_at(i))
        .filter(|f| *f > 0)
        .collect()
}

fn parse_power_summary(record: &Record<'_>) -> PowerSummary {
    PowerSummary {
        battery_capacity_mah: record.f64_at(4),
        computed_power_mah: record.f64_at(5),
        min_drained_power_mah: record.f64_at(6),
        max_drained_power_mah: record.f64_at(7),
    }
}

/// Apply each family's ranking order. Sorts are stable, so ties keep record order.
fn sort_families(snapshot: &mut PowerSnapshot) {
    snapshot.apps.sort_by(|a, b| b.energy_mah.total_cmp(&a.energy_mah));
    snapshot.wakelocks.sort_by(|a, b| b.partial_time_ms.cmp(&a.partial_time_ms));
    snapshot.kernel_wakelocks.sort_by(|a, b| b.time_ms.cmp(&a.time_ms));
    snapshot.alarms.sort_by(|a, b| b.count.cmp(&a.count));
    snapshot.jobs.sort_by(|a, b| b.time_ms.cmp(&a.time_ms));
    snapshot.syncs.sort_by(|a, b| b.time_ms.cmp(&a.time_ms));
    snapshot.network.sort_by_key(|n| std::cmp::Reverse(n.total_bytes()));
    snapshot.sensors.sort_by(|a, b| b.time_ms.cmp(&a.time_ms));
    snapshot.bluetooth.sort_by(|a, b| b.energy.total_cmp(&a.energy));
    snapshot.processes.sort_by_key(|p| std::cmp::Reverse(p.cpu_ms()));
    snapshot.app_cpu.sort_by_key(|c| std::cmp::Reverse(c.cpu_ms()));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DUMP: &str = "\
9,0,i,vers,36,214,QP1A,QP1A
9,0,i,uid,10023,com.example.mail
9,0,i,uid,10050,com.example.maps
9,0,l,bt,0,7200000,3600000,7200000,3600000,1600000000000,5400000,2000000,4000,0,0,0
9,0,l,m,1800000,0,0,0
9,0,l,dc,2.5,7.5
9,0,l,pws,4100,320.5,300,340
9,0,l,sgt,10,20,30,20,20
9,0,l,wsgt,0,0,0,0,50
9,0,l,gcf,300000,600000,1200000
9,0,l,kwl,PowerManagerService.Display,5000,4
9,0,l,kwl,qcom_rx_wakelock,9000,40
9,0,l,di,3,60000,12,30000,3,65000,12,32000,5,7000
9,10023,l,pwi,uid,12.5,0,0,0
9,10023,l,pwi,uid,2.5,0,0,0
9,10050,l,pwi,uid,30.0,0,0,0
9,0,l,pwi,scrn,80.0,0,0,0
9,10023,l,wl,SyncLoop,0,f,0,500,p,3,200,bp,2
9,10050,l,wl,*location*,0,f,0,9000,p,15
9,10023,l,wua,*walarm*:sync,8
9,10050,l,wua,*walarm*:geo,20
9,10023,l,jb,com.example.mail/.SyncJob,4000,2
9,10023,l,sy,com.example.mail/accounts,1500,1
9,10023,l,nt,100,200,300,400,1,2,3,4
9,10050,l,nt,1000,2000,3000,4000,10,20,30,40
9,10050,l,sr,5,120000,3
9,0,l,ble,1000,200,100,0.75
9,10050,l,pr,com.example.maps:gps,400,100,0,2
9,10023,l,pr,com.example.mail,900,300,10,1
9,10023,l,cpu,1200,400
";

    #[test]
    fn test_build_snapshot_populates_families() {
        let snapshot = build_snapshot(Some(SAMPLE_DUMP));

        assert_eq!(snapshot.apps.len(), 2);
        assert_eq!(snapshot.apps[0].name, "com.example.maps");
        assert_eq!(snapshot.apps[0].energy_mah, 30.0);
        assert_eq!(snapshot.apps[1].name, "com.example.mail");
        assert_eq!(snapshot.apps[1].energy_mah, 15.0);

        assert_eq!(snapshot.wakelocks.len(), 2);
        assert_eq!(snapshot.wakelocks[0].name, "*location*");
        assert_eq!(snapshot.wakelocks[0].partial_time_ms, 9000);
        assert_eq!(snapshot.wakelocks[0].partial_count, 15);
        assert_eq!(snapshot.wakelocks[0].background_time_ms, 0);
        assert_eq!(snapshot.wakelocks[1].background_time_ms, 200);
        assert_eq!(snapshot.wakelocks[1].background_count, 2);
        assert_eq!(snapshot.wakelocks[1].app_name, "com.example.mail");

        assert_eq!(snapshot.kernel_wakelocks[0].name, "qcom_rx_wakelock");
        assert_eq!(snapshot.alarms[0].count, 20);
        assert_eq!(snapshot.jobs[0].time_ms, 4000);
        assert_eq!(snapshot.syncs[0].count, 1);
        assert_eq!(snapshot.network[0].app_name, "com.example.maps");
        assert_eq!(snapshot.network[0].total_bytes(), 10_000);
        assert_eq!(snapshot.sensors[0].handle, 5);
        assert_eq!(snapshot.bluetooth[0].app_name, "id:0");
        assert_eq!(snapshot.processes[0].process_name, "com.example.mail");
        assert_eq!(snapshot.app_cpu[0].cpu_ms(), 1600);
        assert_eq!(snapshot.cpu_frequencies_khz, vec![300000, 600000, 1200000]);

        assert_eq!(snapshot.time_on_battery_ms, 7_200_000);
        assert_eq!(snapshot.screen_on_time_ms, 1_800_000);
        assert_eq!(snapshot.discharge_screen_on_pct, 2.5);
        assert_eq!(snapshot.discharge_screen_off_pct, 7.5);
        assert_eq!(snapshot.estimated_capacity_mah, Some(4100.0));
        assert_eq!(snapshot.doze[0].total_idle_ms, 90_000);
        assert_eq!(snapshot.doze[0].maintenance_count, 5);
    }

    #[test]
    fn test_decoding_is_idempotent() {
        assert_eq!(build_snapshot(Some(SAMPLE_DUMP)), build_snapshot(Some(SAMPLE_DUMP)));
    }

    #[test]
    fn test_power_use_items_merge_by_owner() {
        let text = "9,10023,l,pwi,uid,1.25\n9,10023,l,pwi,uid,2.5\n9,10077,l,pwi,uid,0.5\n";
        let snapshot = build_snapshot(Some(text));

        assert_eq!(snapshot.apps.len(), 2);
        assert_eq!(snapshot.apps[0].owner_id, 10023);
        assert_eq!(snapshot.apps[0].energy_mah, 3.75);
        assert_eq!(snapshot.apps[0].name, "id:10023");
        assert_eq!(snapshot.apps[1].owner_id, 10077);
        assert_eq!(snapshot.apps[1].energy_mah, 0.5);
    }

    #[test]
    fn test_mapping_between_power_items_names_merged_entry() {
        let text = "\
9,10023,l,pwi,uid,1.0
9,0,i,uid,10023,com.example.mail
9,10023,l,pwi,uid,2.0
9,10023,l,jb,com.example.mail/.SyncJob,10,1
";
        let snapshot = build_snapshot(Some(text));

        assert_eq!(snapshot.apps.len(), 1);
        assert_eq!(snapshot.apps[0].name, "com.example.mail");
        assert_eq!(snapshot.apps[0].energy_mah, 3.0);
        assert_eq!(snapshot.jobs[0].app_name, snapshot.apps[0].name);
    }

    #[test]
    fn test_unknown_tags_are_ignored() {
        let text = "9,10023,l,wl,Lock,0,f,0,100,p,1\n9,10023,l,zzfuture,1,2,3\n";
        let snapshot = build_snapshot(Some(text));

        assert_eq!(snapshot.wakelocks.len(), 1);
        assert_eq!(snapshot.wakelocks[0].partial_time_ms, 100);
    }

    #[test]
    fn test_short_lines_do_not_disturb_following_records() {
        let text = "9,0\n9,0,l,kwl,alarm,100,2\n";
        let snapshot = build_snapshot(Some(text));

        assert_eq!(snapshot.kernel_wakelocks.len(), 1);
        assert_eq!(snapshot.kernel_wakelocks[0].count, 2);
    }

    #[test]
    fn test_unparsable_owner_drops_record() {
        let text = "9,abc,l,pwi,uid,4.0\n9,abc,l,wl,Lock,0,f,0,100,p,1\n9,10,l,sr,notahandle,5,1\n";
        let snapshot = build_snapshot(Some(text));

        assert!(snapshot.apps.is_empty());
        assert!(snapshot.wakelocks.is_empty());
        assert!(snapshot.sensors.is_empty());
    }

    #[test]
    fn test_wakelock_without_markers_reads_zero() {
        let snapshot = build_snapshot(Some("9,1000,l,wl,Lock,100,f,2\n"));
        let lock = &snapshot.wakelocks[0];
        assert_eq!(lock.partial_time_ms, 0);
        assert_eq!(lock.partial_count, 0);
        assert_eq!(lock.background_count, 0);
    }

    #[test]
    fn test_histogram_normalization() {
        let snapshot = build_snapshot(Some("9,0,l,sgt,10,20,30,20,20\n"));
        let histogram = &snapshot.signal_strength[0];

        let expected = [0.10, 0.20, 0.30, 0.20, 0.20];
        for (actual, expected) in histogram.percentages.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-12);
        }
        let sum: f64 = histogram.percentages.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_histogram_with_zero_total_and_short_record() {
        assert_eq!(normalize_histogram(&[0; 5]), [0.0; 5]);

        let snapshot = build_snapshot(Some("9,0,l,wsgt,10,20,30\n"));
        assert!(snapshot.wifi_signal.is_empty());
    }

    #[test]
    fn test_discharge_shares_last_value_wins() {
        let snapshot = build_snapshot(Some("9,0,l,dc,1.0,2.0\n9,0,l,dc,3.0,4.0\n"));
        assert_eq!(snapshot.discharge_screen_on_pct, 3.0);
        assert_eq!(snapshot.discharge_screen_off_pct, 4.0);
    }

    #[test]
    fn test_capacity_falls_back_to_battery_timing() {
        let snapshot =
            build_snapshot(Some("9,0,l,bt,0,1000,0,0,0,0,0,0,3500\n9,0,l,pws,0,1,1,1\n"));
        assert_eq!(snapshot.estimated_capacity_mah, Some(3500.0));
    }

    #[test]
    fn test_absent_input_is_empty() {
        assert!(build_snapshot(None).is_empty());
        assert!(build_snapshot(Some("")).is_empty());
    }

    #[test]
    fn test_names_resolve_only_after_mapping() {
        let text = "9,10023,l,jb,early,10,1\n9,0,i,uid,10023,com.example.mail\n9,10023,l,jb,late,5,1\n";
        let snapshot = build_snapshot(Some(text));

        assert_eq!(snapshot.jobs[0].app_name, "id:10023");
        assert_eq!(snapshot.jobs[1].app_name, "com.example.mail");
    }
}

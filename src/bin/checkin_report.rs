//! Print a human-readable summary of checkin dumps
//!
//! Run with: cargo run --bin checkin_report -- <pattern>...

use battery_monitor_lib::power::{build_snapshot, list_checkin_files, read_checkin_file, PowerSnapshot};

const TOP_N: usize = 10;

fn main() {
    battery_monitor_lib::init_logging();

    let patterns: Vec<String> = std::env::args().skip(1).collect();
    if patterns.is_empty() {
        eprintln!("usage: checkin_report PATTERN...");
        std::process::exit(2);
    }

    let files = match list_checkin_files(&patterns) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    for path in files {
        match read_checkin_file(&path) {
            Ok(text) => {
                println!("=== {} ===", path.display());
                print_report(&build_snapshot(Some(&text)));
                println!();
            }
            Err(e) => eprintln!("{}: {}", path.display(), e),
        }
    }
}

fn print_report(snapshot: &PowerSnapshot) {
    if snapshot.is_empty() {
        println!("(no recognizable records)");
        return;
    }

    println!("Time on battery:   {}", format_ms(snapshot.time_on_battery_ms));
    println!("Screen on:         {}", format_ms(snapshot.screen_on_time_ms));
    println!(
        "Discharge:         {:.0}% screen on, {:.0}% screen off",
        snapshot.discharge_screen_on_pct, snapshot.discharge_screen_off_pct
    );
    if let Some(capacity) = snapshot.estimated_capacity_mah {
        println!("Capacity:          {:.0} mAh", capacity);
    }

    println!();
    println!("Top apps by energy ({:.2} mAh total)", snapshot.total_app_energy_mah());
    for app in snapshot.apps.iter().take(TOP_N) {
        println!("  {:>10.2} mAh  {}", app.energy_mah, app.name);
    }

    if !snapshot.wakelocks.is_empty() {
        println!();
        println!("Top partial wakelocks");
        for wakelock in snapshot.wakelocks.iter().take(TOP_N) {
            println!(
                "  {:>12}  x{:<5} {} ({})",
                format_ms(wakelock.partial_time_ms),
                wakelock.partial_count,
                wakelock.name,
                wakelock.app_name
            );
        }
    }

    if !snapshot.kernel_wakelocks.is_empty() {
        println!();
        println!("Top kernel wakelocks");
        for wakelock in snapshot.kernel_wakelocks.iter().take(TOP_N) {
            println!("  {:>12}  x{:<5} {}", format_ms(wakelock.time_ms), wakelock.count, wakelock.name);
        }
    }

    if !snapshot.alarms.is_empty() {
        println!();
        println!("Top wakeup alarms");
        for alarm in snapshot.alarms.iter().take(TOP_N) {
            println!("  x{:<6} {} ({})", alarm.count, alarm.name, alarm.app_name);
        }
    }

    if !snapshot.network.is_empty() {
        println!();
        println!("Top network users");
        for usage in snapshot.network.iter().take(TOP_N) {
            println!("  {:>12} B  {}", usage.total_bytes(), usage.app_name);
        }
    }
}

fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

//! Battery Monitor command line
//!
//! Decodes checkin dumps to JSON, optionally recording per-app energy increments into
//! the ledger. `--follow` re-reads a dump on the configured poll interval.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use chrono::{DateTime, Utc};

use battery_monitor_lib::init_logging;
use battery_monitor_lib::power::ledger::AccumulatorSettings;
use battery_monitor_lib::power::{
    build_snapshot, list_checkin_files, load_config, read_checkin_file, spawn_energy_poller,
    IncrementalEnergyAccumulator, MonitorConfig, PowerSnapshot, SqliteLedger,
};

const USAGE: &str = "usage: battery-monitor [--config-dir DIR] [--ledger] [--follow] PATTERN...";

#[derive(Debug, Default)]
struct Args {
    config_dir: Option<String>,
    ledger: bool,
    follow: bool,
    patterns: Vec<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config-dir" => {
                args.config_dir = Some(iter.next().ok_or("--config-dir needs a value")?);
            }
            "--ledger" => args.ledger = true,
            "--follow" => args.follow = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ if arg.starts_with("--") => return Err(format!("unknown option {}\n{}", arg, USAGE)),
            _ => args.patterns.push(arg),
        }
    }

    if args.patterns.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let config = match load_config(args.config_dir.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Failed to load config, using defaults: {}", e);
            MonitorConfig::default()
        }
    };

    let files = match list_checkin_files(&args.patterns) {
        Ok(files) if !files.is_empty() => files,
        Ok(_) => {
            eprintln!("No checkin dumps matched");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = if args.follow {
        if files.len() > 1 {
            log::warn!(
                "--follow polls a single dump; using {:?} and ignoring {} other matches",
                files[0],
                files.len() - 1
            );
        }
        follow(&files[0], &config).await
    } else {
        decode_all(&files, &config, args.ledger)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Decode every dump in order, printing one JSON document per line
fn decode_all(files: &[PathBuf], config: &MonitorConfig, record: bool) -> Result<(), String> {
    let mut ledger = if record {
        Some(SqliteLedger::new(config.ledger_path.as_deref()).map_err(|e| e.to_string())?)
    } else {
        None
    };
    let mut accumulator = IncrementalEnergyAccumulator::new(AccumulatorSettings::from(config));

    for path in files {
        let text = match read_checkin_file(path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };

        let snapshot = build_snapshot(Some(&text));
        if let Some(ledger) = ledger.as_mut() {
            let report = accumulator.accumulate(&snapshot, modified_at(path), ledger);
            log::info!("{:?}: {:?}", path.file_name(), report);
        }

        print_snapshot(&snapshot)?;
    }

    if let Some(ledger) = ledger {
        let count = ledger.get_count().map_err(|e| e.to_string())?;
        log::info!("Ledger holds {} rows", count);
    }
    Ok(())
}

/// Poll one dump file until the process is killed
async fn follow(path: &Path, config: &MonitorConfig) -> Result<(), String> {
    let ledger = SqliteLedger::new(config.ledger_path.as_deref()).map_err(|e| e.to_string())?;
    let source_path = path.to_path_buf();
    let source = move || match read_checkin_file(&source_path) {
        Ok(text) => Some(text),
        Err(e) => {
            log::warn!("Failed to read {:?}: {}", source_path, e);
            None
        }
    };

    log::info!("Following {:?} every {}s", path, config.poll_interval_seconds);
    let (_handle, mut snapshots) = spawn_energy_poller(
        IncrementalEnergyAccumulator::new(AccumulatorSettings::from(config)),
        source,
        ledger,
        Duration::from_secs(config.poll_interval_seconds.max(1)),
    );

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        print_snapshot(&snapshot)?;
    }
    Ok(())
}

fn print_snapshot(snapshot: &PowerSnapshot) -> Result<(), String> {
    let json = serde_json::to_string(snapshot).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

/// Bucket time for a dump: its modification time, or now when unavailable
fn modified_at(path: &Path) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

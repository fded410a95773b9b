//! Hour-bucketed per-app energy ledger

pub mod accumulator;
pub mod models;
pub mod storage;

pub use accumulator::{AccumulateReport, AccumulatorSettings, IncrementalEnergyAccumulator};
pub use models::{hour_bucket, EnergyDelta, LedgerEntry, LedgerKey};
pub use storage::{EnergyLedger, LedgerError, MemoryLedger, SqliteLedger};

//! Battery statistics decoding, drain attribution and energy ledger

pub mod models;
pub mod reader;
pub mod stats;
pub mod config;
pub mod drain;
pub mod ledger;
pub mod background;

pub use models::*;
pub use reader::*;
pub use stats::*;
pub use config::*;
pub use background::*;
pub use drain::{CapacityEstimator, DrainAttributionTracker, DrainReading, DrainSampler, DrainState, ScreenEvent};
pub use ledger::{EnergyLedger, IncrementalEnergyAccumulator, LedgerEntry, LedgerKey, MemoryLedger, SqliteLedger};

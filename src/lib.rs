//! Battery Monitor - checkin decoding, drain attribution and per-app energy ledger

pub mod power;

use std::sync::Once;

static LOGGER: Once = Once::new();

/// Initialize logging once per process.
///
/// RUST_LOG is honoured as given; `info` applies only when it is unset.
pub fn init_logging() {
    LOGGER.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env).try_init();
    });
}

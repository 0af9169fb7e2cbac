//! Test fixtures
//!
//! * [`Environment`] / [`Environments`]: the named connection configurations
//! * [`with_session`] / [`ModuleFixture`]: scoped session acquisition
//! * [`Check`] / [`run_all`]: verification checks against live servers

pub mod checks;
pub mod environment;
pub mod scope;

pub use checks::{
    check_identity, check_tables_present, run_all, Check, CheckOutcome, Report, EXPECTED_TABLES,
};
pub use environment::{Environment, Environments};
pub use scope::{with_session, ModuleFixture};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

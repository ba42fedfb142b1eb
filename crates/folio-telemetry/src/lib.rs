//! Tracing subscriber setup for Folio.
//!
//! Hosts embedding the engine call [`init`] once at startup. The filter comes
//! from `RUST_LOG` when set, otherwise from the directive passed in:
//!
//! ```bash
//! RUST_LOG=folio_kernel=debug my-editor
//! ```
//!
//! Tests call [`init_for_tests`], which routes output through the libtest
//! capture and can be called from every test.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `EnvFilter` + stderr fmt layer.
///
/// Fails if a global subscriber is already installed.
pub fn init(default_directive: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

/// Install a test-writer subscriber; later calls are ignored.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

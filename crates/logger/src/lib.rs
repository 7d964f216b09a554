//! Tracing setup shared by the statement import binaries.
//!
//! Library crates only emit `tracing` events; whoever owns `main` calls
//! [`init`] once. `RUST_LOG` wins over the built-in filter.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str =
    "general_parser=info,utils=info,settings_loader=info,parse_statement=info";

/// Install the global fmt subscriber with the default filter.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Install the global fmt subscriber, falling back to `default_filter` when
/// `RUST_LOG` is unset or invalid. Calling this twice is harmless.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

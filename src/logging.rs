//! Structured logging setup shared by the CLI and the server.

use tracing_subscriber::{fmt, EnvFilter};

/// Set to any value for JSON log lines.
pub const LOG_JSON_ENV: &str = "RALLY_LOG_JSON";

/// Initialise the `tracing` subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = if std::env::var(LOG_JSON_ENV).is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    };

    // A subscriber may already be installed (tests, embedding)
    if let Err(e) = result {
        eprintln!("logging already initialised: {e}");
    }
}

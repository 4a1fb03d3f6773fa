//! File logging for ridelink.
//!
//! stdout carries the NDJSON event stream, so log output only goes to a
//! daily-rotated file. Bearer tokens are never logged, and socket URLs are
//! logged without their query string.

use std::path::PathBuf;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "RIDELINK_LOG";

const DEFAULT_FILTER: &str = "ridelink=info,warn";
const LOG_FILE: &str = "ridelink.log";

/// Install the global subscriber, writing to [`log_directory`].
///
/// ```bash
/// RIDELINK_LOG=ridelink_socket=trace ridelink --ride R1 --participant P1
/// ```
pub fn init() -> Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(rolling::daily(&log_dir, LOG_FILE))
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        dir = %log_dir.display(),
        "ridelink logging started"
    );
    Ok(())
}

/// `{data_local_dir}/ridelink/logs`, or `./ridelink/logs` without one
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ridelink")
        .join("logs")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_namespaced() {
        assert!(log_directory().ends_with("ridelink/logs"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}

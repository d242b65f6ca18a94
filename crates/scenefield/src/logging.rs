#![forbid(unsafe_code)]

//! Subscriber installation for binaries and tests.
//!
//! The filter comes from `SCENEFIELD_LOG` (same syntax as `RUST_LOG`) and
//! defaults to `warn`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "SCENEFIELD_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    #[cfg(feature = "log-json")]
    Json,
}

/// Filter from [`LOG_ENV`], or the default when unset or invalid.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global subscriber. Returns `false` if one was already set.
pub fn init(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true);
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        #[cfg(feature = "log-json")]
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

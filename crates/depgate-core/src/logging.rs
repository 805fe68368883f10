#![forbid(unsafe_code)]

//! Log bootstrap.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding binary's decision. With the `tracing-json` feature,
//! [`init_json_logging`] installs a JSON formatter filtered by the
//! `DEPGATE_LOG` environment variable (falling back to `info`).

/// Environment variable holding the log filter directive.
pub const LOG_FILTER_ENV: &str = "DEPGATE_LOG";

/// Filter used when [`LOG_FILTER_ENV`] is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install a global JSON log subscriber.
#[cfg(feature = "tracing-json")]
pub fn init_json_logging() -> Result<(), crate::error::LoggingError> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| crate::error::LoggingError::AlreadyInstalled(err.to_string()))
}

#![forbid(unsafe_code)]

//! Global log subscriber installation.
//!
//! The runtime itself only emits `tracing` events. Hosts that do not bring
//! their own subscriber can enable the `subscriber` feature and call
//! [`install`] once at startup.

use crate::config::RuntimeConfig;
use std::fmt;

/// Installing the global subscriber failed.
#[derive(Debug)]
pub enum LoggingError {
    /// `log_filter` is not a valid env-filter directive.
    InvalidFilter(String),
    /// Another global subscriber is already set.
    SubscriberAlreadySet,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::InvalidFilter(msg) => write!(f, "invalid log filter: {msg}"),
            LoggingError::SubscriberAlreadySet => f.write_str("a global subscriber is already set"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Install a `fmt` subscriber filtered by `config.log_filter`.
#[cfg(feature = "subscriber")]
pub fn install(config: &RuntimeConfig) -> Result<(), LoggingError> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|_| LoggingError::SubscriberAlreadySet)?;
    tracing::info!(filter = %config.log_filter, "logging installed");
    Ok(())
}

/// Without the `subscriber` feature there is nothing to install.
#[cfg(not(feature = "subscriber"))]
pub fn install(config: &RuntimeConfig) -> Result<(), LoggingError> {
    tracing::debug!(filter = %config.log_filter, "subscriber feature disabled, not installing");
    Ok(())
}

#[cfg(all(test, feature = "subscriber"))]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_filter() {
        let config = RuntimeConfig::new().with_log_filter("actstack=[");
        assert!(matches!(install(&config), Err(LoggingError::InvalidFilter(_))));
    }
}

//! Structured logging.
//!
//! # Responsibilities
//! - Install a global `tracing` subscriber for processes embedding the client
//! - Honor `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - Installing twice is an error, not a panic

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::LoggingConfig;

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub fn default_filter(level: &str) -> String {
    format!("control_channel={level}")
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = default_filter(&config.level);
    EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidFilter {
        filter: directive,
        reason: e.to_string(),
    })
}

/// Install the global subscriber described by `config`.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;

    tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_targets_this_crate() {
        assert_eq!(default_filter("debug"), "control_channel=debug");
    }

    #[test]
    fn second_init_is_an_error() {
        let config = LoggingConfig::default();
        // The first call may race other tests; the second must fail either way.
        let _ = init(&config);
        assert!(matches!(init(&config), Err(LoggingError::AlreadyInstalled(_))));
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the endpoint URL and its scheme
//! - Validate value ranges (timeouts > 0, buffers > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ChannelConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;
use url::Url;

use crate::config::schema::ChannelConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Schemes the handshake knows how to upgrade.
pub const SUPPORTED_SCHEMES: [&str; 4] = ["https", "wss", "http", "ws"];

/// A single semantic problem with a [`ChannelConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("url is required")]
    MissingUrl,

    #[error("url '{url}' is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("url scheme '{0}' is not one of https, wss, http, ws")]
    UnsupportedScheme(String),

    #[error("region is required")]
    MissingRegion,

    #[error("service_name is required")]
    MissingServiceName,

    #[error("timeouts.connect_ms must be greater than zero")]
    ZeroConnectTimeout,

    #[error("buffers.{0} must be greater than zero")]
    ZeroBuffer(&'static str),

    #[error("tls.ca_bundle_path '{0}' is not a readable file")]
    UnreadableCaBundle(String),

    #[error("logging.level '{0}' is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),
}

pub fn validate_config(config: &ChannelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.url.is_empty() {
        errors.push(ValidationError::MissingUrl);
    } else {
        match Url::parse(&config.url) {
            Ok(url) if !SUPPORTED_SCHEMES.contains(&url.scheme()) => {
                errors.push(ValidationError::UnsupportedScheme(url.scheme().to_string()));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidUrl {
                url: config.url.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if config.region.is_empty() {
        errors.push(ValidationError::MissingRegion);
    }
    if config.service_name.is_empty() {
        errors.push(ValidationError::MissingServiceName);
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }
    if config.buffers.read_bytes == 0 {
        errors.push(ValidationError::ZeroBuffer("read_bytes"));
    }
    if config.buffers.write_bytes == 0 {
        errors.push(ValidationError::ZeroBuffer("write_bytes"));
    }
    if let Some(path) = &config.tls.ca_bundle_path {
        if !path.is_file() {
            errors.push(ValidationError::UnreadableCaBundle(path.display().to_string()));
        }
    }
    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(config.logging.level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

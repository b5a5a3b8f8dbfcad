//! Configuration schema definitions.
//!
//! Every section derives Serde traits and is fully defaulted, so a file with
//! just `url` and `region` is a complete configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service name used when signing the upgrade request.
pub const DEFAULT_SERVICE_NAME: &str = "ecs";
/// Bound on the direct TCP connect plus TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
/// WebSocket read buffer size in bytes.
pub const DEFAULT_READ_BUFFER_BYTES: usize = 4096;
/// WebSocket write buffer size in bytes.
pub const DEFAULT_WRITE_BUFFER_BYTES: usize = 32768;

/// Root configuration for one control channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Control plane endpoint (`https://`, `wss://`, `http://` or `ws://`).
    pub url: String,

    /// Signing region.
    pub region: String,

    /// Signing service name.
    pub service_name: String,

    /// Skip server certificate verification. Test environments only.
    pub accept_invalid_cert: bool,

    pub timeouts: TimeoutConfig,

    pub buffers: BufferConfig,

    pub tls: TlsConfig,

    pub logging: LoggingConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            region: String::new(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            accept_invalid_cert: false,
            timeouts: TimeoutConfig::default(),
            buffers: BufferConfig::default(),
            tls: TlsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Minimal configuration for `url` in `region`, everything else defaulted.
    pub fn new(url: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            region: region.into(),
            ..Self::default()
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Direct-path connect timeout in milliseconds. Not applied through a proxy.
    pub connect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

/// WebSocket buffer sizes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    pub read_bytes: usize,
    pub write_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            read_bytes: DEFAULT_READ_BUFFER_BYTES,
            write_bytes: DEFAULT_WRITE_BUFFER_BYTES,
        }
    }
}

/// Extra trust configuration for the control plane certificate.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle appended to the built-in web PKI roots.
    pub ca_bundle_path: Option<PathBuf>,
}

/// Logging configuration used by `observability::logging::init`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this crate when `RUST_LOG` is unset.
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

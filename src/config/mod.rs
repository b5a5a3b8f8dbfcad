//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ChannelConfig (validated, immutable)
//!     → handed to ClientServer::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the connection identity is fixed at construction
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{BufferConfig, ChannelConfig, LoggingConfig, TimeoutConfig, TlsConfig};
pub use validation::{validate_config, ValidationError};

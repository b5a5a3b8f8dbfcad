//! Handshake request signing.
//!
//! # Data Flow
//! ```text
//! CredentialsProvider (static, environment, or application supplied)
//!     → credentials.rs (access key, secret, optional session token)
//!     → sigv4.rs (canonical request, string to sign, HMAC chain)
//!     → Authorization / X-Amz-Date / X-Amz-Security-Token headers
//!     → carried by the WebSocket upgrade request
//! ```
//!
//! # Security Constraints
//! - Secrets are never logged; `Debug` output is redacted
//! - Only headers are signed; the upgrade GET has an empty payload

pub mod credentials;
pub mod sigv4;

pub use credentials::{
    Credentials, CredentialsError, CredentialsProvider, EnvironmentCredentials, StaticCredentials,
};
pub use sigv4::{RequestSigner, SigningError};

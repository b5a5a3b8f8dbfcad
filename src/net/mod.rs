//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! "host:port"
//!     → dialer.rs (route selection: direct or proxy)
//!     → proxy.rs (SOCKS5 tunnel, only when all_proxy is set)
//!     → tls.rs (rustls client config, optional cert skip)
//!     → encrypted stream handed to the WebSocket handshake
//!
//! Connection States:
//!     Absent → Open → Closed
//! ```
//!
//! # Design Decisions
//! - The dialer knows nothing about the message protocol
//! - The proxy path has no timeout; only the direct path is bounded
//! - Streams are boxed so tests can hand the handshake a plain TCP socket

use tokio::io::{AsyncRead, AsyncWrite};

pub mod connection;
pub mod dialer;
pub mod proxy;
pub mod tls;

pub use connection::{ConnectionId, ConnectionState};
pub use dialer::{DialError, DialRoute, Dialer, TlsDialer};
pub use proxy::{ProxyError, ProxySettings};

/// A bidirectional byte stream the WebSocket layer can run over.
pub trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ControlStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Owned, type-erased stream returned by a [`Dialer`].
pub type BoxedStream = Box<dyn ControlStream>;

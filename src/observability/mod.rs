//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handshake, dispatch and send produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters via the metrics facade)
//!
//! Consumers:
//!     → whatever subscriber / recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a global recorder on its own
//! - `logging::init` is a convenience for binaries and tests, not required
//! - Metrics are cheap when no recorder is installed (no-op facade)

pub mod logging;
pub mod metrics;

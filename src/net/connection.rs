//! Connection identity and lifecycle state.
//!
//! # Responsibilities
//! - Generate unique connection IDs for log correlation
//! - Model the Absent → Open → Closed lifecycle of a control channel

use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one established control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Lifecycle state of a control channel.
///
/// A channel never leaves `Closed`; reconnecting creates a new channel with a
/// fresh [`ConnectionId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been established yet.
    Absent,
    /// Upgrade succeeded; frames may be read and written.
    Open,
    /// Closed locally, by the peer, or after a read error.
    Closed,
}

impl ConnectionState {
    /// Whether the channel can still carry frames.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

//! Persistent control-channel client for host agents.
//!
//! # Architecture Overview
//!
//! ```text
//!   owning agent
//!     │ add_request_handler / set_any_request_handler
//!     ▼
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │                        ClientServer                          │
//!  │                                                              │
//!  │  connect ──▶ signing ──▶ net::dialer ──▶ WebSocket upgrade   │
//!  │                          (direct | proxy)   (client::handshake)│
//!  │                                                              │
//!  │  serve   ──▶ read frame ──▶ protocol::envelope::decode       │
//!  │                               ──▶ any-handler ──▶ handler    │
//!  │                                                              │
//!  │  make_request ──▶ protocol::envelope::encode ──▶ write lock  │
//!  └──────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//!   control plane (wss://…)
//! ```

// Wire model
pub mod protocol;
pub mod signing;

// Transport
pub mod client;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use client::{ClientError, ClientServer, RequestSender, ServiceError};
pub use config::ChannelConfig;
pub use protocol::{InboundMessage, Payload, TypeRegistry};
pub use signing::{Credentials, CredentialsProvider};

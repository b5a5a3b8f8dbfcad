//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound: typed payload
//!     → registry.rs (Rust type → wire name)
//!     → envelope.rs (serialize payload, wrap as {type, message})
//!     → one text frame
//!
//! Inbound: one frame
//!     → envelope.rs (parse {type, message})
//!     → registry.rs (wire name → decoder)
//!     → InboundMessage (wire name + type-erased payload)
//! ```
//!
//! # Design Decisions
//! - Registrations are explicit and typed; nothing is discovered at runtime
//! - An unknown inbound type is a per-frame decode failure, never fatal
//! - The codec is pure and shared by handshake, dispatch and send

pub mod envelope;
pub mod registry;

pub use envelope::{decode, encode, CodecError, Envelope, InboundMessage};
pub use registry::{AnyPayload, Payload, RegistryError, TypeRegistry, TypeRegistryBuilder};

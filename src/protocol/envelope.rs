//! `{type, message}` envelope codec.
//!
//! Over the wire every frame looks like
//! `{"type":"AckRequest","message":{"messageId":"xyz"}}`. The envelope layer
//! treats `message` as opaque JSON; the registry turns it into a typed value.

use std::any::{type_name, Any};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::protocol::registry::{AnyPayload, Payload, TypeRegistry};

/// Wire envelope shared by inbound and outbound frames.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub type_name: String,
    pub message: Box<RawValue>,
}

/// Errors raised by [`encode`] and [`decode`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// Outbound payload type has no wire name.
    #[error("unrecognized outbound request type: {rust_type}")]
    UnrecognizedType { rust_type: &'static str },

    /// Outbound payload could not be serialized.
    #[error("unable to serialize {type_name} request: {source}")]
    NotSerializable {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Inbound bytes are not an envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// Inbound wire name is not in the registry.
    #[error("unrecognized message type: {0}")]
    UnknownType(String),

    /// Inbound message does not match its registered type.
    #[error("unable to decode {type_name} message: {source}")]
    InvalidMessage {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded inbound message: wire name plus type-erased payload.
#[derive(Clone)]
pub struct InboundMessage {
    type_name: Arc<str>,
    payload: AnyPayload,
}

impl InboundMessage {
    pub(crate) fn new(type_name: &str, payload: AnyPayload) -> Self {
        Self {
            type_name: Arc::from(type_name),
            payload,
        }
    }

    /// Wire type name the message arrived under.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the payload as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Share the payload as `Arc<T>`, if that is its type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }

    /// Whether the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub(crate) fn payload(&self) -> AnyPayload {
        Arc::clone(&self.payload)
    }
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Encode `payload` into the bytes of one text frame.
pub fn encode<T: Payload>(registry: &TypeRegistry, payload: &T) -> Result<String, CodecError> {
    let type_name = registry
        .type_name_of::<T>()
        .ok_or(CodecError::UnrecognizedType {
            rust_type: type_name::<T>(),
        })?;

    let not_serializable = |source| CodecError::NotSerializable {
        type_name: type_name.to_string(),
        source,
    };

    let message = serde_json::value::to_raw_value(payload).map_err(not_serializable)?;
    let envelope = Envelope {
        type_name: type_name.to_string(),
        message,
    };
    serde_json::to_string(&envelope).map_err(not_serializable)
}

/// Decode one frame into its typed payload.
pub fn decode(registry: &TypeRegistry, data: &[u8]) -> Result<InboundMessage, CodecError> {
    let envelope: Envelope = serde_json::from_slice(data).map_err(CodecError::MalformedEnvelope)?;

    let payload = registry
        .decode_message(&envelope.type_name, &envelope.message)
        .ok_or_else(|| CodecError::UnknownType(envelope.type_name.clone()))?
        .map_err(|source| CodecError::InvalidMessage {
            type_name: envelope.type_name.clone(),
            source,
        })?;

    Ok(InboundMessage::new(&envelope.type_name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pong {
        id: String,
        #[serde(default)]
        latency_ms: u64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Unregistered {
        value: u8,
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register::<Ping>("Ping")
            .register::<Pong>("Pong")
            .build()
            .unwrap()
    }

    #[test]
    fn ping_round_trip() {
        let registry = registry();
        let ping = Ping { id: "a".to_string() };

        let wire = encode(&registry, &ping).unwrap();
        let value: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value, serde_json::json!({"type": "Ping", "message": {"id": "a"}}));

        let decoded = decode(&registry, wire.as_bytes()).unwrap();
        assert_eq!(decoded.type_name(), "Ping");
        assert_eq!(decoded.downcast_ref::<Ping>(), Some(&ping));
        assert!(!decoded.is::<Pong>());
    }

    #[test]
    fn unregistered_outbound_type_is_named() {
        let err = encode(&registry(), &Unregistered { value: 1 }).unwrap_err();
        match err {
            CodecError::UnrecognizedType { rust_type } => assert!(rust_type.ends_with("Unregistered")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_inbound_type() {
        let err = decode(&registry(), br#"{"type":"Nope","message":{}}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(name) if name == "Nope"));
    }

    #[test]
    fn malformed_envelope() {
        let err = decode(&registry(), b"not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));

        let err = decode(&registry(), br#"{"message":{}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));
    }

    #[test]
    fn message_shape_mismatch() {
        let err = decode(&registry(), br#"{"type":"Pong","message":{"latency_ms":3}}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidMessage { ref type_name, .. } if type_name == "Pong"));
    }

    #[test]
    fn downcast_shares_payload() {
        let registry = registry();
        let decoded = decode(&registry, br#"{"type":"Pong","message":{"id":"b"}}"#).unwrap();
        let pong = decoded.downcast::<Pong>().unwrap();
        assert_eq!(pong.latency_ms, 0);
        assert!(decoded.downcast::<Ping>().is_none());
    }
}

//! Client error taxonomy.

use std::any::Any;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::net::DialError;
use crate::protocol::{envelope, CodecError, Envelope, InboundMessage, TypeRegistry};
use crate::signing::{CredentialsError, SigningError};

/// Errors surfaced by [`ClientServer`](crate::ClientServer).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The control plane URL did not parse.
    #[error("invalid control plane URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The URL scheme cannot carry a WebSocket.
    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    /// The upgrade request could not be built.
    #[error("invalid upgrade request: {0}")]
    InvalidRequest(#[source] Box<WsError>),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Dial(#[from] DialError),

    /// The upgrade was rejected and the response was not a modeled error.
    #[error("websocket upgrade failed: {source} (response body: {body:?})")]
    Handshake {
        status: Option<u16>,
        body: String,
        #[source]
        source: Box<WsError>,
    },

    /// The upgrade was rejected with a modeled control plane error.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A handler was registered for a type the registry does not know.
    #[error("handler argument type not recognized: {rust_type}")]
    UnregisteredHandler { rust_type: &'static str },

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No open connection to read from or write to.
    #[error("control channel is not connected")]
    NotConnected,

    /// `serve` is already running for this connection.
    #[error("control channel is already being served")]
    AlreadyServing,

    /// Reading or writing frames failed.
    #[error("control channel transport error: {0}")]
    Transport(#[source] Box<WsError>),
}

impl ClientError {
    /// Whether this is a setup mistake rather than a runtime condition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ClientError::UnregisteredHandler { .. }
                | ClientError::Codec(CodecError::UnrecognizedType { .. })
                | ClientError::InvalidUrl { .. }
                | ClientError::UnsupportedScheme(_)
        )
    }
}

/// A modeled error returned by the control plane in place of an upgrade.
#[derive(Clone)]
pub struct ServiceError {
    payload: InboundMessage,
    message: Option<String>,
}

impl ServiceError {
    /// Decode an HTTP error body as one of the registry's payload types.
    pub fn decode(registry: &TypeRegistry, body: &[u8]) -> Result<Self, CodecError> {
        let payload = envelope::decode(registry, body)?;
        let message = serde_json::from_slice::<Envelope>(body)
            .ok()
            .and_then(|envelope| serde_json::from_str::<Value>(envelope.message.get()).ok())
            .and_then(|value| {
                ["message", "Message"]
                    .iter()
                    .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
            });
        Ok(Self { payload, message })
    }

    /// Wire type name of the error payload.
    pub fn type_name(&self) -> &str {
        self.payload.type_name()
    }

    /// Human-readable message carried by the payload, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The decoded payload.
    pub fn payload(&self) -> &InboundMessage {
        &self.payload
    }

    /// Borrow the payload as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceError")
            .field("type_name", &self.type_name())
            .field("message", &self.message)
            .finish()
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name(), message),
            None => write!(f, "{}", self.type_name()),
        }
    }
}

impl std::error::Error for ServiceError {}

//! Serve loop: read frames in order and route them to handlers.
//!
//! # Responsibilities
//! - Read one frame at a time and decode it
//! - Await the any-handler, then the typed handler, before reading on
//! - Stop cleanly on end of stream or local close, with an error otherwise
//!
//! # Design Decisions
//! - Strict arrival order: a slow handler stalls the whole channel
//! - A malformed or unknown frame is logged and skipped, never fatal

use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::client::error::ClientError;
use crate::client::handler::HandlerTable;
use crate::net::ConnectionState;
use crate::observability::metrics;
use crate::protocol::{envelope, TypeRegistry};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// A typed handler ran (after the any-handler, if set).
    Handled,
    /// Decoded, but no typed handler is registered for its type.
    Unhandled,
    /// The frame could not be decoded and was dropped.
    Undecodable,
}

/// Decode `data` and run the matching handlers to completion.
pub(crate) async fn dispatch(registry: &TypeRegistry, handlers: &HandlerTable, data: &[u8]) -> Dispatch {
    let message = match envelope::decode(registry, data) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Unable to handle message from control plane");
            metrics::record_decode_failure();
            return Dispatch::Undecodable;
        }
    };
    let type_name = message.type_name().to_string();
    metrics::record_message_received(&type_name);

    if let Some(any) = handlers.any() {
        any.call(message.clone()).await;
    }

    match handlers.get(&type_name).and_then(|handler| handler.call(message.payload())) {
        Some(handling) => {
            handling.await;
            Dispatch::Handled
        }
        None => {
            tracing::info!(type_name = %type_name, "No handler for message type");
            metrics::record_unhandled(&type_name);
            Dispatch::Unhandled
        }
    }
}

/// Run the read loop until the stream ends, the connection is closed
/// locally, or a read fails.
pub(crate) async fn serve_frames<S>(
    mut frames: S,
    mut state: watch::Receiver<ConnectionState>,
    registry: &TypeRegistry,
    handlers: &HandlerTable,
) -> Result<(), ClientError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = state.wait_for(|state| !state.is_open()) => {
                tracing::debug!("Connection closed locally, stopping serve loop");
                return Ok(());
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                tracing::debug!(message = %text.as_str(), "Got a message from control plane");
                dispatch(registry, handlers, text.as_bytes()).await;
            }
            Some(Ok(Message::Binary(data))) => {
                // Not expected on this channel, but still worth trying to decode.
                tracing::error!(len = data.len(), "Unexpected binary frame from control plane");
                dispatch(registry, handlers, &data).await;
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(close_frame = ?frame, "Control plane closed the connection");
                return Ok(());
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                tracing::info!("Control channel stream ended");
                return Ok(());
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Error getting message from control plane");
                return Err(ClientError::Transport(Box::new(e)));
            }
        }
    }
}

//! One live WebSocket session: split halves, write lock, close signal.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::client::error::ClientError;
use crate::net::{BoxedStream, ConnectionId, ConnectionState};

pub(crate) type WsStream = WebSocketStream<BoxedStream>;
pub(crate) type FrameReader = SplitStream<WsStream>;
type FrameWriter = SplitSink<WsStream, Message>;

/// An upgraded connection owned by a [`ClientServer`](crate::ClientServer).
///
/// The read half is handed to exactly one serve loop; the write half is
/// shared by every sender behind an async mutex.
pub(crate) struct Session {
    id: ConnectionId,
    writer: Mutex<Option<FrameWriter>>,
    reader: Mutex<Option<FrameReader>>,
    state: watch::Sender<ConnectionState>,
    span: tracing::Span,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, stream: WsStream, span: tracing::Span) -> Self {
        let (writer, reader) = stream.split();
        let (state, _) = watch::channel(ConnectionState::Open);
        Self {
            id,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            state,
            span,
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Take the read half; `None` once a serve loop owns it.
    pub(crate) async fn take_reader(&self) -> Option<FrameReader> {
        self.reader.lock().await.take()
    }

    /// Write one text frame, holding the write lock for the whole frame.
    pub(crate) async fn send_text(&self, frame: String) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        let sink = match writer.as_mut() {
            Some(sink) if self.state().is_open() => sink,
            _ => return Err(ClientError::NotConnected),
        };
        sink.send(Message::text(frame))
            .await
            .map_err(|e| ClientError::Transport(Box::new(e)))
    }

    /// Mark the session closed and release the write half.
    ///
    /// Wakes a serve loop blocked on a read. Closing twice is a no-op.
    pub(crate) async fn close(&self) -> Result<(), ClientError> {
        let previous = self.state.send_replace(ConnectionState::Closed);
        let Some(mut sink) = self.writer.lock().await.take() else {
            return Ok(());
        };
        tracing::debug!(parent: &self.span, was = ?previous, "Closing control channel");

        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(ClientError::Transport(Box::new(e))),
        }
    }

    /// Called when the serve loop stops for any reason.
    pub(crate) async fn finish(&self) {
        self.state.send_replace(ConnectionState::Closed);
        self.writer.lock().await.take();
    }
}

//! Cloneable handle for writing requests to the control plane.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::Instrument;

use crate::client::error::ClientError;
use crate::client::session::Session;
use crate::observability::metrics;
use crate::protocol::{envelope, Payload, TypeRegistry};

/// Sends typed requests over whichever connection is current.
///
/// Cheap to clone; handlers capture one to reply from inside `serve`.
/// A sender obtained before `connect` works once the connection is open.
#[derive(Clone)]
pub struct RequestSender {
    registry: Arc<TypeRegistry>,
    current: Arc<ArcSwapOption<Session>>,
}

impl RequestSender {
    pub(crate) fn new(registry: Arc<TypeRegistry>, current: Arc<ArcSwapOption<Session>>) -> Self {
        Self { registry, current }
    }

    /// Encode `request` and write it as one text frame.
    ///
    /// Encoding happens before the write lock is taken, so an unregistered
    /// type fails without touching the connection.
    pub async fn send<T: Payload>(&self, request: &T) -> Result<(), ClientError> {
        let frame = envelope::encode(&self.registry, request)?;
        let type_name = self.registry.type_name_of::<T>().unwrap_or_default();

        let Some(session) = self.current.load_full() else {
            return Err(ClientError::NotConnected);
        };

        let span = session.span().clone();
        async {
            tracing::debug!(type_name, len = frame.len(), "Sending request");
            session.send_text(frame).await?;
            metrics::record_request_sent(type_name);
            Ok::<(), ClientError>(())
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for RequestSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSender")
            .field("connection", &self.current.load_full().map(|s| s.id()))
            .finish()
    }
}

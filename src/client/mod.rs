//! Client-server facade over one control channel.
//!
//! # Responsibilities
//! - Own the handler table and the current connection
//! - Open the channel (signed upgrade), serve it, close it
//! - Hand out cloneable senders for concurrent writes
//!
//! # Data Flow
//! ```text
//! connect() → handshake.rs → Session (Open)
//! serve()   → dispatch.rs  (read half, in order) → handler.rs
//! make_request() / RequestSender → sender.rs → Session write lock
//! close()   → Session (Closed) → serve() returns Ok
//! ```
//!
//! # Design Decisions
//! - Handlers are awaited inline; a slow handler delays every later frame
//! - One socket per facade; `connect` on an open facade replaces it
//! - Every connection gets its own span carrying the connection id

mod dispatch;
mod error;
mod handler;
mod handshake;
mod sender;
mod session;

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::Instrument;

pub use error::{ClientError, ServiceError};
pub use sender::RequestSender;

use crate::config::ChannelConfig;
use crate::net::{ConnectionId, ConnectionState, Dialer, TlsDialer};
use crate::observability::metrics::{self, ConnectOutcome};
use crate::protocol::{InboundMessage, Payload, TypeRegistry};
use crate::signing::{CredentialsProvider, RequestSigner};
use handler::HandlerTable;
use handshake::Handshake;
use session::Session;

/// A persistent, typed, bidirectional channel to the control plane.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use control_channel::{ChannelConfig, ClientServer, TypeRegistry};
/// # use control_channel::signing::EnvironmentCredentials;
/// # #[derive(serde::Serialize, serde::Deserialize)] struct Heartbeat { healthy: bool }
/// # async fn run() -> Result<(), control_channel::ClientError> {
/// let registry = TypeRegistry::builder()
///     .register::<Heartbeat>("HeartbeatMessage")
///     .build()
///     .expect("registry");
/// let client = ClientServer::new(
///     ChannelConfig::new("https://ecs.us-west-2.amazonaws.com/ws", "us-west-2"),
///     registry,
///     Arc::new(EnvironmentCredentials),
/// );
/// client.add_request_handler(|beat: Arc<Heartbeat>| async move {
///     tracing::info!(healthy = beat.healthy, "Heartbeat");
/// })?;
/// client.connect().await?;
/// client.serve().await
/// # }
/// ```
pub struct ClientServer {
    config: ChannelConfig,
    registry: Arc<TypeRegistry>,
    credentials: Arc<dyn CredentialsProvider>,
    dialer: Arc<dyn Dialer>,
    signer: RequestSigner,
    handlers: HandlerTable,
    current: Arc<ArcSwapOption<Session>>,
}

impl ClientServer {
    /// Create a client that dials through [`TlsDialer`], honoring `all_proxy`.
    pub fn new(
        config: ChannelConfig,
        registry: TypeRegistry,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        let mut dialer = TlsDialer::from_env();
        if let Some(path) = &config.tls.ca_bundle_path {
            dialer = dialer.with_ca_bundle(path);
        }
        Self::with_dialer(config, registry, credentials, Arc::new(dialer))
    }

    /// Create a client that opens its streams with `dialer`.
    pub fn with_dialer(
        config: ChannelConfig,
        registry: TypeRegistry,
        credentials: Arc<dyn CredentialsProvider>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let signer = RequestSigner::new(config.region.clone(), config.service_name.clone());
        Self {
            config,
            registry: Arc::new(registry),
            credentials,
            dialer,
            signer,
            handlers: HandlerTable::default(),
            current: Arc::new(ArcSwapOption::empty()),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register the handler for messages of type `T`, replacing any previous one.
    ///
    /// Fails with [`ClientError::UnregisteredHandler`] if `T` is not in the
    /// registry, leaving the handler table unchanged.
    pub fn add_request_handler<T, F, Fut>(&self, handler: F) -> Result<(), ClientError>
    where
        T: Payload,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.register(&self.registry, handler)?;
        tracing::debug!(
            rust_type = std::any::type_name::<T>(),
            handlers = self.handlers.len(),
            "Request handler registered"
        );
        Ok(())
    }

    /// Set the handler that sees every decoded message before its typed handler.
    pub fn set_any_request_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.set_any(handler);
    }

    /// Send `request` as one text frame on the current connection.
    pub async fn make_request<T: Payload>(&self, request: &T) -> Result<(), ClientError> {
        self.sender().send(request).await
    }

    /// A cloneable sender that follows this client across reconnects.
    pub fn sender(&self) -> RequestSender {
        RequestSender::new(Arc::clone(&self.registry), Arc::clone(&self.current))
    }

    /// Lifecycle state of the current connection.
    pub fn state(&self) -> ConnectionState {
        self.current
            .load_full()
            .map_or(ConnectionState::Absent, |session| session.state())
    }

    /// Id of the current connection, if one was ever opened.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.current.load_full().map(|session| session.id())
    }

    /// Dial, sign and upgrade. Handlers are not touched.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let id = ConnectionId::new();
        let span = tracing::info_span!("control_channel", connection_id = %id, url = %self.config.url);

        let handshake = Handshake {
            config: &self.config,
            registry: &self.registry,
            signer: &self.signer,
            credentials: self.credentials.as_ref(),
            dialer: self.dialer.as_ref(),
        };
        let stream = match handshake.run().instrument(span.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                let outcome = match &e {
                    ClientError::Service(_) | ClientError::Handshake { .. } => ConnectOutcome::Rejected,
                    _ => ConnectOutcome::Failed,
                };
                metrics::record_connect(outcome);
                return Err(e);
            }
        };
        metrics::record_connect(ConnectOutcome::Success);

        let session = Arc::new(Session::new(id, stream, span.clone()));
        if let Some(previous) = self.current.swap(Some(session)) {
            if previous.state().is_open() {
                tracing::warn!(
                    parent: &span,
                    previous = %previous.id(),
                    "Connect called on an open channel, replacing it"
                );
                if let Err(e) = previous.close().await {
                    tracing::debug!(parent: &span, error = %e, "Error closing replaced channel");
                }
            }
        }

        tracing::info!(parent: &span, "Control channel connected");
        Ok(())
    }

    /// Read and dispatch frames until the channel ends.
    ///
    /// Returns `Ok(())` when the peer closes or the stream ends, or after a
    /// local [`close`](Self::close). Any other read failure is returned.
    /// Either way the connection is `Closed` afterwards.
    pub async fn serve(&self) -> Result<(), ClientError> {
        let session = self.current.load_full().ok_or(ClientError::NotConnected)?;
        if !session.state().is_open() {
            return Err(ClientError::NotConnected);
        }
        let reader = session.take_reader().await.ok_or(ClientError::AlreadyServing)?;

        let span = session.span().clone();
        let result = async {
            tracing::debug!("Serving control channel");
            dispatch::serve_frames(reader, session.watch_state(), &self.registry, &self.handlers).await
        }
        .instrument(span.clone())
        .await;

        session.finish().await;
        match &result {
            Ok(()) => tracing::info!(parent: &span, "Control channel closed"),
            Err(e) => tracing::warn!(parent: &span, error = %e, "Control channel failed"),
        }
        result
    }

    /// Close the current connection, unblocking `serve`.
    ///
    /// A no-op when nothing is open.
    pub async fn close(&self) -> Result<(), ClientError> {
        match self.current.load_full() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ClientServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientServer")
            .field("url", &self.config.url)
            .field("registry", &self.registry)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

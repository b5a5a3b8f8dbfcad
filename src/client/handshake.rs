//! Signed WebSocket upgrade.
//!
//! # Data Flow
//! ```text
//! ChannelConfig.url
//!     → parse, map http(s) → ws(s), dial target host:port (443 default)
//!     → GET request signed with the current credentials
//!     → Dialer (direct or proxy, then TLS)
//!     → WebSocket upgrade with configured buffer sizes
//!     → on rejection: body decoded as a ServiceError when possible
//! ```

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::Url;

use crate::client::error::{ClientError, ServiceError};
use crate::client::session::WsStream;
use crate::config::ChannelConfig;
use crate::net::Dialer;
use crate::protocol::TypeRegistry;
use crate::signing::{CredentialsProvider, RequestSigner};

const DEFAULT_PORT: u16 = 443;

/// Everything one upgrade attempt needs, borrowed from the facade.
pub(crate) struct Handshake<'a> {
    pub config: &'a ChannelConfig,
    pub registry: &'a TypeRegistry,
    pub signer: &'a RequestSigner,
    pub credentials: &'a dyn CredentialsProvider,
    pub dialer: &'a dyn Dialer,
}

impl Handshake<'_> {
    pub(crate) async fn run(&self) -> Result<WsStream, ClientError> {
        let url = Url::parse(&self.config.url).map_err(|source| ClientError::InvalidUrl {
            url: self.config.url.clone(),
            source,
        })?;
        let ws_url = websocket_url(&url)?;
        let target = dial_target(&url)?;

        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::InvalidRequest(Box::new(e)))?;
        let credentials = self.credentials.credentials().await?;
        self.signer.sign("GET", &url, request.headers_mut(), &credentials)?;

        let stream = self
            .dialer
            .dial(&target, self.config.timeouts.connect(), self.config.accept_invalid_cert)
            .await?;

        let ws_config = WebSocketConfig::default()
            .read_buffer_size(self.config.buffers.read_bytes)
            .write_buffer_size(self.config.buffers.write_bytes);

        match tokio_tungstenite::client_async_with_config(request, stream, Some(ws_config)).await {
            Ok((stream, response)) => {
                tracing::debug!(status = %response.status(), target = %target, "WebSocket upgrade complete");
                Ok(stream)
            }
            Err(e) => Err(upgrade_error(self.registry, e)),
        }
    }
}

/// URL used for the upgrade request: `http`/`https` become `ws`/`wss`.
pub(crate) fn websocket_url(url: &Url) -> Result<Url, ClientError> {
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };
    let mut ws_url = url.clone();
    if ws_url.scheme() != scheme && ws_url.set_scheme(scheme).is_err() {
        return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
    }
    Ok(ws_url)
}

/// `host:port` to dial; the port defaults to 443 whatever the scheme.
pub(crate) fn dial_target(url: &Url) -> Result<String, ClientError> {
    let host = url
        .host_str()
        .ok_or_else(|| ClientError::UnsupportedScheme(url.scheme().to_string()))?;
    Ok(format!("{}:{}", host, url.port().unwrap_or(DEFAULT_PORT)))
}

fn upgrade_error(registry: &TypeRegistry, error: WsError) -> ClientError {
    let (status, body) = match &error {
        WsError::Http(response) => (
            Some(response.status().as_u16()),
            response.body().as_deref().map(<[u8]>::to_vec).unwrap_or_default(),
        ),
        _ => (None, Vec::new()),
    };

    if !body.is_empty() {
        match ServiceError::decode(registry, &body) {
            Ok(service) => {
                tracing::warn!(status, error = %service, "Control plane rejected the connection");
                return ClientError::Service(service);
            }
            Err(e) => tracing::debug!(error = %e, "Upgrade response body is not a modeled error"),
        }
    }

    let body = String::from_utf8_lossy(&body).into_owned();
    tracing::warn!(status, body = %body, error = %error, "Error creating a websocket client");
    ClientError::Handshake {
        status,
        body,
        source: Box::new(error),
    }
}

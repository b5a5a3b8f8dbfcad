//! Secure dialing to the control plane.
//!
//! # Responsibilities
//! - Choose between the direct and the proxy route for a target
//! - Bound the direct TCP connect and TLS handshake with one timeout
//! - Layer a TLS client session on top of the TCP stream
//!
//! The proxy route does not honor the timeout: neither tunnel establishment
//! through the proxy nor the TLS handshake after it has a deadline. This is a
//! known gap kept as observable behavior.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::net::proxy::{ProxyError, ProxySettings};
use crate::net::tls;
use crate::net::BoxedStream;

/// Errors produced while dialing.
#[derive(Debug, Error)]
pub enum DialError {
    /// The target could not be split into host and port.
    #[error("invalid dial target '{0}'")]
    InvalidTarget(String),

    /// The direct TCP connect and TLS handshake did not finish in time.
    #[error("connect to {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// The direct TCP connect failed.
    #[error("connect to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Tunnel setup through the proxy failed.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// The TLS client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// The host is not a valid TLS server name.
    #[error("invalid TLS server name '{0}'")]
    ServerName(String),

    /// The TLS handshake failed.
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

/// Produces an encrypted stream to `host:port`.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a stream to `target`, bounding the connect by `timeout` where
    /// the route supports it.
    async fn dial(
        &self,
        target: &str,
        timeout: Duration,
        accept_invalid_cert: bool,
    ) -> Result<BoxedStream, DialError>;
}

/// Route chosen for a dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialRoute {
    /// Plain TCP connect; connect and TLS handshake together are bounded by `timeout`.
    Direct { timeout: Duration },
    /// Tunnel through the proxy at `proxy`; no timeout applies.
    Proxy { proxy: String },
}

/// Default dialer: TCP (direct or via SOCKS5) followed by rustls.
#[derive(Debug, Clone, Default)]
pub struct TlsDialer {
    proxy: Option<ProxySettings>,
    ca_bundle: Option<PathBuf>,
}

impl TlsDialer {
    /// Create a dialer using the proxy configured in the environment.
    ///
    /// An unusable proxy configuration is logged and ignored.
    pub fn from_env() -> Self {
        let proxy = match ProxySettings::from_env() {
            Ok(proxy) => proxy,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid proxy configuration");
                None
            }
        };
        Self::with_proxy(proxy)
    }

    /// Create a dialer with an explicit proxy choice.
    pub fn with_proxy(proxy: Option<ProxySettings>) -> Self {
        Self {
            proxy,
            ca_bundle: None,
        }
    }

    /// Trust the certificates in `path` in addition to the bundled roots.
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Route a dial to `target` would take.
    pub fn route(&self, target: &str, timeout: Duration) -> DialRoute {
        match &self.proxy {
            Some(proxy) if !proxy.bypasses(hostname(target)) => DialRoute::Proxy {
                proxy: proxy.address().to_string(),
            },
            _ => DialRoute::Direct { timeout },
        }
    }

    /// Open the TCP stream for `target` along its route.
    pub async fn connect_tcp(&self, target: &str, timeout: Duration) -> Result<TcpStream, DialError> {
        match (self.route(target, timeout), &self.proxy) {
            (DialRoute::Proxy { proxy }, Some(settings)) => {
                tracing::info!(host = %target, proxy = %proxy, "Creating proxy connection");
                Ok(settings.connect(target).await?)
            }
            _ => {
                tracing::info!(host = %target, timeout_ms = timeout.as_millis() as u64, "Creating direct connection");
                match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(source)) => Err(DialError::Connect {
                        host: target.to_string(),
                        source,
                    }),
                    Err(_) => Err(DialError::Timeout {
                        host: target.to_string(),
                        timeout,
                    }),
                }
            }
        }
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    async fn dial(
        &self,
        target: &str,
        timeout: Duration,
        accept_invalid_cert: bool,
    ) -> Result<BoxedStream, DialError> {
        let host = hostname(target);
        if host.is_empty() {
            return Err(DialError::InvalidTarget(target.to_string()));
        }
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| DialError::ServerName(host.to_string()))?;
        let config = tls::client_config(accept_invalid_cert, self.ca_bundle.as_deref())?;

        let connector = TlsConnector::from(config);
        let session = async {
            let tcp = self.connect_tcp(target, timeout).await?;
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|source| DialError::Handshake {
                    host: target.to_string(),
                    source,
                })
        };
        let stream = match self.route(target, timeout) {
            DialRoute::Direct { timeout } => tokio::time::timeout(timeout, session)
                .await
                .map_err(|_| DialError::Timeout {
                    host: target.to_string(),
                    timeout,
                })??,
            DialRoute::Proxy { .. } => session.await?,
        };

        tracing::debug!(host = %target, "TLS session established");
        Ok(Box::new(stream))
    }
}

/// Host part of `host:port`, without IPv6 brackets.
pub(crate) fn hostname(target: &str) -> &str {
    let host = match target.rfind(':') {
        // A bare IPv6 literal has colons but no closing bracket before the port.
        Some(pos) if !target[pos..].contains(']') => &target[..pos],
        _ => target,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

//! Environment-configured outbound proxy.
//!
//! # Responsibilities
//! - Read `all_proxy` / `ALL_PROXY` and `no_proxy` / `NO_PROXY`
//! - Open a TCP tunnel to the target through a SOCKS5 proxy
//!
//! Only `socks5://` and `socks5h://` proxies are understood, matching what
//! the agent's environment conventions support. Tunnel setup has no timeout.

use std::net::IpAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

/// Variables that enable the proxy path, checked in order.
pub const ALL_PROXY_ENV_VARS: [&str; 2] = ["all_proxy", "ALL_PROXY"];

/// Variables listing hosts that bypass the proxy, checked in order.
pub const NO_PROXY_ENV_VARS: [&str; 2] = ["no_proxy", "NO_PROXY"];

const SOCKS_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_PASSWORD: u8 = 0x02;
const AUTH_UNACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Errors raised while resolving or using the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy URL could not be parsed.
    #[error("invalid proxy URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The proxy URL uses a scheme other than SOCKS5.
    #[error("unsupported proxy scheme '{0}'")]
    UnsupportedScheme(String),

    /// The tunnel target is not of the form `host:port`.
    #[error("invalid proxy target '{0}'")]
    InvalidTarget(String),

    /// I/O failure talking to the proxy.
    #[error("proxy I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The proxy violated the SOCKS5 protocol.
    #[error("proxy protocol error: {0}")]
    Protocol(String),

    /// The proxy rejected every offered authentication method.
    #[error("proxy rejected authentication")]
    AuthRejected,

    /// The proxy refused to open the tunnel.
    #[error("proxy refused connection to {target} (reply code {code})")]
    ConnectRefused { target: String, code: u8 },
}

/// Resolved proxy configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Proxy address as `host:port`.
    address: String,
    /// Optional username/password for SOCKS5 authentication.
    auth: Option<(String, String)>,
    /// Hosts that bypass the proxy.
    no_proxy: Vec<String>,
}

impl ProxySettings {
    /// Read the proxy configuration from the process environment.
    pub fn from_env() -> Result<Option<Self>, ProxyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the proxy configuration through an arbitrary variable lookup.
    ///
    /// Returns `Ok(None)` when no proxy variable is set or it is empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ProxyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty())
        };

        let Some(raw) = first_set(&ALL_PROXY_ENV_VARS) else {
            return Ok(None);
        };

        let url = Url::parse(raw.trim()).map_err(|e| ProxyError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "socks5" | "socks5h" => {}
            other => return Err(ProxyError::UnsupportedScheme(other.to_string())),
        }

        let host = url.host_str().ok_or_else(|| ProxyError::InvalidUrl {
            url: raw.clone(),
            reason: "missing host".to_string(),
        })?;
        let port = url.port().unwrap_or(1080);

        let auth = if url.username().is_empty() {
            None
        } else {
            Some((
                url.username().to_string(),
                url.password().unwrap_or_default().to_string(),
            ))
        };

        let no_proxy = first_set(&NO_PROXY_ENV_VARS)
            .map(|value| {
                value
                    .split(',')
                    .map(|entry| entry.trim().to_ascii_lowercase())
                    .filter(|entry| !entry.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(Self {
            address: format!("{}:{}", host, port),
            auth,
            no_proxy,
        }))
    }

    /// Proxy address as `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether `host` (without port) is listed in `no_proxy`.
    pub fn bypasses(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();
        self.no_proxy.iter().any(|entry| {
            if entry == "*" {
                return true;
            }
            let zone = entry.trim_start_matches('*').trim_start_matches('.');
            host == zone || host.ends_with(&format!(".{}", zone))
        })
    }

    /// Open a TCP stream to `target` (`host:port`) through the proxy.
    pub async fn connect(&self, target: &str) -> Result<TcpStream, ProxyError> {
        let (host, port) = split_target(target)?;
        let mut stream = TcpStream::connect(&self.address).await?;

        let methods: &[u8] = if self.auth.is_some() {
            &[AUTH_NONE, AUTH_PASSWORD]
        } else {
            &[AUTH_NONE]
        };
        let mut greeting = vec![SOCKS_VERSION, methods.len() as u8];
        greeting.extend_from_slice(methods);
        stream.write_all(&greeting).await?;

        let mut choice = [0u8; 2];
        stream.read_exact(&mut choice).await?;
        if choice[0] != SOCKS_VERSION {
            return Err(ProxyError::Protocol(format!(
                "unexpected SOCKS version {}",
                choice[0]
            )));
        }
        match choice[1] {
            AUTH_NONE => {}
            AUTH_PASSWORD => self.authenticate(&mut stream).await?,
            AUTH_UNACCEPTABLE => return Err(ProxyError::AuthRejected),
            other => {
                return Err(ProxyError::Protocol(format!(
                    "proxy selected unoffered method {}",
                    other
                )))
            }
        }

        let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => {
                request.push(ATYP_IPV4);
                request.extend_from_slice(&ip.octets());
            }
            Ok(IpAddr::V6(ip)) => {
                request.push(ATYP_IPV6);
                request.extend_from_slice(&ip.octets());
            }
            Err(_) => {
                let name = host.as_bytes();
                if name.len() > u8::MAX as usize {
                    return Err(ProxyError::InvalidTarget(target.to_string()));
                }
                request.push(ATYP_DOMAIN);
                request.push(name.len() as u8);
                request.extend_from_slice(name);
            }
        }
        request.extend_from_slice(&port.to_be_bytes());
        stream.write_all(&request).await?;

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await?;
        if reply[0] != SOCKS_VERSION {
            return Err(ProxyError::Protocol(format!(
                "unexpected SOCKS version {} in reply",
                reply[0]
            )));
        }
        if reply[1] != 0x00 {
            return Err(ProxyError::ConnectRefused {
                target: target.to_string(),
                code: reply[1],
            });
        }

        // Bound address is ignored, but must be drained from the stream.
        let addr_len = match reply[3] {
            ATYP_IPV4 => 4,
            ATYP_IPV6 => 16,
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await?;
                len[0] as usize
            }
            other => {
                return Err(ProxyError::Protocol(format!(
                    "unknown address type {} in reply",
                    other
                )))
            }
        };
        let mut bound = vec![0u8; addr_len + 2];
        stream.read_exact(&mut bound).await?;

        Ok(stream)
    }

    async fn authenticate(&self, stream: &mut TcpStream) -> Result<(), ProxyError> {
        let Some((user, pass)) = &self.auth else {
            return Err(ProxyError::Protocol(
                "proxy requested credentials that were not configured".to_string(),
            ));
        };
        if user.len() > u8::MAX as usize || pass.len() > u8::MAX as usize {
            return Err(ProxyError::Protocol("proxy credentials too long".to_string()));
        }

        let mut request = vec![0x01, user.len() as u8];
        request.extend_from_slice(user.as_bytes());
        request.push(pass.len() as u8);
        request.extend_from_slice(pass.as_bytes());
        stream.write_all(&request).await?;

        let mut status = [0u8; 2];
        stream.read_exact(&mut status).await?;
        if status[1] != 0x00 {
            return Err(ProxyError::AuthRejected);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySettings")
            .field("address", &self.address)
            .field("auth", &self.auth.as_ref().map(|(user, _)| user))
            .field("no_proxy", &self.no_proxy)
            .finish()
    }
}

fn split_target(target: &str) -> Result<(&str, u16), ProxyError> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| ProxyError::InvalidTarget(target.to_string()))?;
    let port = port
        .parse()
        .map_err(|_| ProxyError::InvalidTarget(target.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host, port))
}

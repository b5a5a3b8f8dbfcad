//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::Message;

use control_channel::net::{BoxedStream, DialError, Dialer, TlsDialer};
use control_channel::signing::{Credentials, StaticCredentials};
use control_channel::{ChannelConfig, ClientServer, TypeRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDeniedFault {
    pub message: String,
}

pub fn registry() -> TypeRegistry {
    TypeRegistry::builder()
        .register::<Ping>("Ping")
        .register::<Pong>("Pong")
        .register::<AccessDeniedFault>("AccessDeniedException")
        .build()
        .unwrap()
}

pub fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new(Credentials::new(
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        Some("session-token".to_string()),
    )))
}

/// Client pointed at `ws://addr/ws` using the plain-TCP dialer.
pub fn client_for(addr: SocketAddr) -> ClientServer {
    client_with_dialer(addr, Arc::new(PlainDialer::default()))
}

pub fn client_with_dialer(addr: SocketAddr, dialer: Arc<dyn Dialer>) -> ClientServer {
    let config = ChannelConfig::new(format!("http://{}/ws?agent=test", addr), "us-west-2");
    ClientServer::with_dialer(config, registry(), credentials(), dialer)
}

/// Dialer that skips TLS and records every target it was asked for.
#[derive(Default)]
pub struct PlainDialer {
    pub targets: Mutex<Vec<String>>,
}

#[async_trait]
impl Dialer for PlainDialer {
    async fn dial(
        &self,
        target: &str,
        _timeout: Duration,
        _accept_invalid_cert: bool,
    ) -> Result<BoxedStream, DialError> {
        self.targets.lock().unwrap().push(target.to_string());
        let stream = TcpStream::connect(target).await.map_err(|source| DialError::Connect {
            host: target.to_string(),
            source,
        })?;
        Ok(Box::new(stream))
    }
}

/// Dialer that routes like [`TlsDialer`] (direct or proxy) but skips TLS.
pub struct RoutedPlainDialer(pub TlsDialer);

#[async_trait]
impl Dialer for RoutedPlainDialer {
    async fn dial(
        &self,
        target: &str,
        timeout: Duration,
        _accept_invalid_cert: bool,
    ) -> Result<BoxedStream, DialError> {
        let stream = self.0.connect_tcp(target, timeout).await?;
        Ok(Box::new(stream))
    }
}

/// One-connection WebSocket server standing in for the control plane.
pub struct MockControlPlane {
    pub addr: SocketAddr,
    /// Headers of the upgrade request.
    pub headers: oneshot::Receiver<HeaderMap>,
    /// Text frames received from the client.
    pub inbound: mpsc::UnboundedReceiver<String>,
    /// Frames to push to the client; dropping it closes the connection.
    pub outbound: mpsc::UnboundedSender<Message>,
}

impl MockControlPlane {
    pub fn push(&self, frame: &str) {
        self.outbound.send(Message::text(frame.to_string())).unwrap();
    }

    pub async fn next_inbound(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("control plane connection ended");
        serde_json::from_str(&text).unwrap()
    }
}

pub async fn start_control_plane() -> MockControlPlane {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (headers_tx, headers_rx) = oneshot::channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| {
            let _ = headers_tx.send(request.headers().clone());
            Ok::<Response, ErrorResponse>(response)
        };
        let ws = tokio_tungstenite::accept_hdr_async(socket, callback).await.unwrap();
        let (mut write, mut read) = ws.split();

        tokio::spawn(async move {
            while let Some(Ok(frame)) = read.next().await {
                if let Message::Text(text) = frame {
                    if inbound_tx.send(text.to_string()).is_err() {
                        break;
                    }
                }
            }
        });

        while let Some(frame) = outbound_rx.recv().await {
            if write.send(frame).await.is_err() {
                return;
            }
        }
        let _ = write.close().await;
    });

    MockControlPlane {
        addr,
        headers: headers_rx,
        inbound: inbound_rx,
        outbound: outbound_tx,
    }
}

/// HTTP server that answers every request with `status` and `body`.
pub async fn start_rejecting_server(status: &'static str, body: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                read_http_head(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

async fn read_http_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// SOCKS5 proxy that stalls for `delay` before answering the greeting.
pub struct MockSocksProxy {
    pub addr: SocketAddr,
    /// `host:port` of every CONNECT request, in order.
    pub connects: mpsc::UnboundedReceiver<String>,
}

pub async fn start_socks5_proxy(
    delay: Duration,
    credentials: Option<(&'static str, &'static str)>,
) -> MockSocksProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connects_tx, connects_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let connects = connects_tx.clone();
            tokio::spawn(async move {
                let _ = serve_socks5(socket, delay, credentials, connects).await;
            });
        }
    });

    MockSocksProxy {
        addr,
        connects: connects_rx,
    }
}

async fn serve_socks5(
    mut client: TcpStream,
    delay: Duration,
    credentials: Option<(&'static str, &'static str)>,
    connects: mpsc::UnboundedSender<String>,
) -> std::io::Result<()> {
    tokio::time::sleep(delay).await;

    let mut head = [0u8; 2];
    client.read_exact(&mut head).await?;
    let mut methods = vec![0u8; head[1] as usize];
    client.read_exact(&mut methods).await?;

    match credentials {
        Some((user, pass)) => {
            client.write_all(&[0x05, 0x02]).await?;
            let mut version_len = [0u8; 2];
            client.read_exact(&mut version_len).await?;
            let mut got_user = vec![0u8; version_len[1] as usize];
            client.read_exact(&mut got_user).await?;
            let mut pass_len = [0u8; 1];
            client.read_exact(&mut pass_len).await?;
            let mut got_pass = vec![0u8; pass_len[0] as usize];
            client.read_exact(&mut got_pass).await?;
            if got_user != user.as_bytes() || got_pass != pass.as_bytes() {
                client.write_all(&[0x01, 0x01]).await?;
                return Ok(());
            }
            client.write_all(&[0x01, 0x00]).await?;
        }
        None => client.write_all(&[0x05, 0x00]).await?,
    }

    let mut request = [0u8; 4];
    client.read_exact(&mut request).await?;
    let host = match request[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        0x03 => {
            let mut len = [0u8; 1];
            client.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            client.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        _ => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip).await?;
            format!("[{}]", std::net::Ipv6Addr::from(ip))
        }
    };
    let mut port = [0u8; 2];
    client.read_exact(&mut port).await?;
    let target = format!("{}:{}", host, u16::from_be_bytes(port));
    let _ = connects.send(target.clone());

    let mut upstream = match TcpStream::connect(&target).await {
        Ok(upstream) => upstream,
        Err(_) => {
            client.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
    };
    client.write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0]).await?;
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}

/// TLS echo server whose certificate for `localhost` is signed by a private CA.
pub struct TlsEchoServer {
    pub addr: SocketAddr,
    /// PEM of the issuing CA, for use as a CA bundle.
    pub ca_pem: String,
}

pub async fn start_tls_echo_server() -> TlsEchoServer {
    let mut ca_params = rcgen::CertificateParams::default();
    ca_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "Control Channel Test CA");
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca_key = rcgen::KeyPair::generate().unwrap();
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let leaf_params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    let leaf_key = rcgen::KeyPair::generate().unwrap();
    let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![leaf_cert.der().clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der())),
        )
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // A client that rejects the certificate aborts the handshake here.
                let Ok(mut stream) = acceptor.accept(socket).await else {
                    return;
                };
                let mut buf = [0u8; 1024];
                while let Ok(n) = stream.read(&mut buf).await {
                    if n == 0 || stream.write_all(&buf[..n]).await.is_err() || stream.flush().await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    TlsEchoServer {
        addr,
        ca_pem: ca_cert.pem(),
    }
}

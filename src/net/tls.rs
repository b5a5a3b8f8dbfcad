//! TLS client configuration.
//!
//! Trust anchors are the bundled web PKI roots, optionally extended with a
//! PEM bundle from disk. When certificate checks are disabled the verifier
//! still validates handshake signatures, it just accepts any chain.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::net::dialer::DialError;

/// Build the rustls client configuration used for every control channel.
pub fn client_config(
    accept_invalid_cert: bool,
    ca_bundle: Option<&Path>,
) -> Result<Arc<ClientConfig>, DialError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .map_err(|e| DialError::TlsConfig(e.to_string()))?;

    let config = if accept_invalid_cert {
        tracing::warn!("TLS certificate verification disabled for control channel");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(root_store(ca_bundle)?)
            .with_no_client_auth()
    };

    Ok(Arc::new(config))
}

fn root_store(ca_bundle: Option<&Path>) -> Result<RootCertStore, DialError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = ca_bundle {
        let file = File::open(path).map_err(|e| {
            DialError::TlsConfig(format!("unable to open CA bundle {}: {}", path.display(), e))
        })?;
        let mut reader = BufReader::new(file);
        let mut added = 0usize;
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| {
                DialError::TlsConfig(format!("invalid CA bundle {}: {}", path.display(), e))
            })?;
            roots
                .add(cert)
                .map_err(|e| DialError::TlsConfig(format!("rejected CA certificate: {}", e)))?;
            added += 1;
        }
        tracing::debug!(path = %path.display(), added, "Loaded extra CA certificates");
    }

    Ok(roots)
}

/// Verifier that accepts any certificate chain and hostname.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

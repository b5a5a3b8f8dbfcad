//! AWS Signature Version 4 header signing for the upgrade request.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue, AUTHORIZATION, HOST};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use url::Url;

use crate::signing::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const AMZ_DATE_HEADER: &str = "x-amz-date";
const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";

/// SHA-256 of the empty body; the upgrade GET never carries one.
const EMPTY_PAYLOAD_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Errors raised while signing.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The URL has no host to sign.
    #[error("URL has no host: {0}")]
    MissingHost(String),

    /// A computed header value is not valid HTTP.
    #[error("invalid header value for {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    /// The HMAC key was rejected.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Signs requests for one region/service pair.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
        }
    }

    /// Sign `method url` with the current time, adding the auth headers.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &mut HeaderMap,
        credentials: &Credentials,
    ) -> Result<(), SigningError> {
        self.sign_at(method, url, headers, credentials, Utc::now())
    }

    /// Sign `method url` as of `now`.
    ///
    /// Sets `Host`, `X-Amz-Date`, `X-Amz-Security-Token` (when the
    /// credentials carry a session token) and `Authorization`. Only those
    /// headers are part of the signature.
    pub fn sign_at(
        &self,
        method: &str,
        url: &Url,
        headers: &mut HeaderMap,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<(), SigningError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let host = host_header(url)?;
        let mut signed: Vec<(&'static str, String)> = vec![("host", host), (AMZ_DATE_HEADER, amz_date.clone())];
        if let Some(token) = credentials.session_token() {
            signed.push((SECURITY_TOKEN_HEADER, token.to_string()));
        }
        signed.sort_by(|a, b| a.0.cmp(b.0));

        let canonical_headers: String = signed
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = signed.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.to_ascii_uppercase(),
            canonical_uri(url),
            canonical_query(url),
            canonical_headers,
            signed_headers,
            EMPTY_PAYLOAD_SHA256,
        );

        let scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes())),
        );

        let key = self.signing_key(credentials.secret_access_key(), &date)?;
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            credentials.access_key_id(),
            scope,
            signed_headers,
            signature,
        );

        for (name, value) in &signed {
            let header = if *name == "host" {
                HOST
            } else {
                HeaderName::from_static(*name)
            };
            headers.insert(header, header_value(*name, value)?);
        }
        headers.insert(AUTHORIZATION, header_value("authorization", &authorization)?);

        tracing::trace!(
            service = %self.service,
            region = %self.region,
            signed_headers = %signed_headers,
            "Signed upgrade request"
        );
        Ok(())
    }

    fn signing_key(&self, secret: &str, date: &str) -> Result<Vec<u8>, SigningError> {
        let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
        let k_region = hmac(&k_date, self.region.as_bytes())?;
        let k_service = hmac(&k_region, self.service.as_bytes())?;
        hmac(&k_service, b"aws4_request")
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, SigningError> {
    HeaderValue::from_str(value).map_err(|e| SigningError::InvalidHeader {
        name,
        reason: e.to_string(),
    })
}

fn host_header(url: &Url) -> Result<String, SigningError> {
    let host = url
        .host_str()
        .ok_or_else(|| SigningError::MissingHost(url.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn canonical_uri(url: &Url) -> String {
    match url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

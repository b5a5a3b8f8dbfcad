//! Signing credentials and the providers that supply them.

use async_trait::async_trait;
use thiserror::Error;

/// Environment variable holding the access key id.
pub const ACCESS_KEY_ENV_VAR: &str = "AWS_ACCESS_KEY_ID";

/// Environment variable holding the secret access key.
pub const SECRET_KEY_ENV_VAR: &str = "AWS_SECRET_ACCESS_KEY";

/// Environment variable holding the optional session token.
pub const SESSION_TOKEN_ENV_VAR: &str = "AWS_SESSION_TOKEN";

/// Errors raised while obtaining credentials.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// A required variable or field is missing.
    #[error("missing credential: {0}")]
    Missing(&'static str),

    /// The provider failed for a provider-specific reason.
    #[error("credential provider failed: {0}")]
    Provider(String),
}

/// Signing material for one handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// Create credentials from their parts.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Supplies credentials each time a handshake is signed.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, CredentialsError>;
}

/// Provider returning a fixed set of credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials, CredentialsError> {
        Ok(self.0.clone())
    }
}

/// Provider reading the standard AWS environment variables on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentCredentials;

impl EnvironmentCredentials {
    /// Resolve credentials through an arbitrary variable lookup.
    pub fn resolve<F>(lookup: F) -> Result<Credentials, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let access_key_id = non_empty(ACCESS_KEY_ENV_VAR).ok_or(CredentialsError::Missing(ACCESS_KEY_ENV_VAR))?;
        let secret_access_key = non_empty(SECRET_KEY_ENV_VAR).ok_or(CredentialsError::Missing(SECRET_KEY_ENV_VAR))?;

        Ok(Credentials::new(
            access_key_id,
            secret_access_key,
            non_empty(SESSION_TOKEN_ENV_VAR),
        ))
    }
}

#[async_trait]
impl CredentialsProvider for EnvironmentCredentials {
    async fn credentials(&self) -> Result<Credentials, CredentialsError> {
        Self::resolve(|key| std::env::var(key).ok())
    }
}

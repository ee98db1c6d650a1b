//! OAuth token endpoint.
//!
//! The chat client hands out a one-time authorization code; turning it
//! into tokens (and refreshing or revoking them later) happens over
//! HTTPS against the chat service's OAuth API. The session only sees the
//! [`TokenEndpoint`] trait, so tests can swap in a fake.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::SessionError;

/// The application's OAuth identity.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A successful token response. `expires_in` is in seconds.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Exchanges, refreshes, and revokes OAuth tokens.
///
/// Failures should come back as [`SessionError::TokenExchange`]; the
/// session reacts to them by discarding stored credentials and asking
/// the user to authorize again.
pub trait TokenEndpoint: Send + Sync + 'static {
    /// Trades an authorization code from `AUTHORIZE` for tokens.
    fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
    ) -> impl Future<Output = Result<OAuthTokens, SessionError>> + Send;

    /// Trades a refresh token for a new token pair.
    fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> impl Future<Output = Result<OAuthTokens, SessionError>> + Send;

    /// Revokes a single access or refresh token.
    fn revoke(
        &self,
        credentials: &ClientCredentials,
        token: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// [`TokenEndpoint`] talking to the real OAuth API over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    base_url: String,
    redirect_uri: String,
    timeout: Duration,
}

impl Default for HttpTokenEndpoint {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}

impl HttpTokenEndpoint {
    pub const DEFAULT_BASE_URL: &'static str = "https://discord.com/api/v10";
    pub const DEFAULT_REDIRECT_URI: &'static str = "http://localhost";
    /// Per-request limit; a stalled OAuth API fails instead of hanging.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            redirect_uri: Self::DEFAULT_REDIRECT_URI.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the `redirect_uri` sent with code exchanges. It must
    /// match one registered for the application.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Uses a preconfigured HTTP client (proxies, timeouts, ...).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<OAuthTokens, SessionError> {
        let url = format!("{}/oauth2/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(form)
            .send()
            .await
            .map_err(http_error)?;
        let response = response.error_for_status().map_err(http_error)?;
        response.json::<OAuthTokens>().await.map_err(http_error)
    }
}

fn http_error(e: reqwest::Error) -> SessionError {
    // reqwest includes the URL, never the form body, so this is safe to log.
    SessionError::TokenExchange(e.to_string())
}

impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
    ) -> Result<OAuthTokens, SessionError> {
        tracing::debug!(client_id = %credentials.client_id, "exchanging authorization code");
        self.token_request(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<OAuthTokens, SessionError> {
        tracing::debug!(client_id = %credentials.client_id, "refreshing access token");
        self.token_request(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn revoke(&self, credentials: &ClientCredentials, token: &str) -> Result<(), SessionError> {
        let url = format!("{}/oauth2/token/revoke", self.base_url);
        self.client
            .post(&url)
            .timeout(self.timeout)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("token", token),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http_error)?;
        Ok(())
    }
}

//! Provider traits.

use async_trait::async_trait;
use authgate_core::{ErrorKind, SessionState};
use http::request::Parts;
use thiserror::Error;
use url::Url;

use crate::data::ProviderData;

/// Provider errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Identity provider answered with a non-success status.
    #[error("got {status} from {endpoint:?} {body}")]
    Upstream {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The provider does not implement this operation.
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),

    /// Callback arrived without an authorization code.
    #[error("missing code")]
    MissingCode,

    /// Token could not be verified or parsed.
    #[error("Invalid token: {0}")]
    Token(String),

    /// No cached group membership for the caller.
    #[error("session need to be re-established for {0}")]
    UnknownUser(String),

    /// Authorization was requested without a session.
    #[error("session not established")]
    NoSession,
}

impl ProviderError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Upstream { .. } | Self::Network(_) | Self::MissingCode => ErrorKind::Upstream,
            Self::Token(_) | Self::NoSession => ErrorKind::TamperedOrExpired,
            Self::UnknownUser(_) => ErrorKind::UnknownUser,
            Self::Serialization(_) | Self::Unsupported(_) => ErrorKind::Internal,
        }
    }

    /// Whether this is a [`ProviderError::Unsupported`].
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Identity provider.
///
/// Every variant supplies its [`ProviderData`], code redemption, and email
/// lookup. The other operations have defaults a variant may override.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static provider configuration.
    fn data(&self) -> &ProviderData;

    /// Provider name.
    fn name(&self) -> &str {
        &self.data().name
    }

    /// Build the authorization URL.
    ///
    /// `nonce` is sent when non-empty; `extra` parameters are appended.
    fn get_login_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
        extra: &[(String, String)],
    ) -> Url {
        let mut params = extra.to_vec();
        if !nonce.is_empty() {
            params.push(("nonce".to_string(), nonce.to_string()));
        }
        self.data().login_url(redirect_uri, state, &params)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// The returned session carries tokens only; identity is filled in by
    /// [`enrich_session`](Self::enrich_session).
    async fn redeem(
        &self,
        redirect_uri: &str,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<SessionState, ProviderError>;

    /// Exchange the refresh token for a new session.
    async fn refresh(&self, _session: &SessionState) -> Result<SessionState, ProviderError> {
        Err(ProviderError::Unsupported("refresh"))
    }

    /// Check that the session's token is still accepted. Does not mutate the session.
    async fn validate_session(&self, session: &SessionState) -> bool {
        let data = self.data();
        if data.no_validate {
            return true;
        }
        match &data.validate_url {
            Some(url) => crate::request::validate_token(data, url, &session.access_token).await,
            None => false,
        }
    }

    /// Look up the caller's email address.
    async fn get_email_address(&self, session: &SessionState) -> Result<String, ProviderError>;

    /// Fill identity fields after redeem or refresh.
    async fn enrich_session(&self, session: &mut SessionState) -> Result<(), ProviderError> {
        if session.email.is_empty() {
            session.email = self.get_email_address(session).await?;
        }
        Ok(())
    }

    /// Decide whether the session may access the request's host and path.
    fn validate_request(
        &self,
        _request: &Parts,
        _session: Option<&SessionState>,
    ) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

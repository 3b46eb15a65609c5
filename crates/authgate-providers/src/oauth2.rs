//! Generic OAuth2 provider with a bearer-authenticated profile endpoint.

use async_trait::async_trait;
use authgate_core::SessionState;
use serde_json::Value;
use tracing::debug;

use crate::data::ProviderData;
use crate::request::{claim_path, get_json_bearer, parse_groups, post_token_form};
use crate::traits::{Provider, ProviderError};

const DEFAULT_NAME: &str = "OAuth2";
const DEFAULT_SCOPE: &str = "openid email profile";

/// Plain OAuth2 provider.
///
/// Client credentials go in the form body. Identity is read from the profile
/// endpoint JSON at the configured claim paths, which may be dotted.
#[derive(Debug)]
pub struct OAuth2Provider {
    data: ProviderData,
}

/// Identity fields read from the profile endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// Email address.
    pub email: String,
    /// Username.
    pub user: String,
    /// Group memberships.
    pub groups: Vec<String>,
}

impl OAuth2Provider {
    /// Create a new OAuth2 provider.
    ///
    /// The validate endpoint defaults to the profile endpoint.
    #[must_use]
    pub fn new(mut data: ProviderData) -> Self {
        data.set_defaults(DEFAULT_NAME, DEFAULT_SCOPE);
        if data.validate_url.is_none() {
            data.validate_url.clone_from(&data.profile_url);
        }
        Self { data }
    }

    /// Fetch identity fields from the profile endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if no profile endpoint is configured, the call fails, or
    /// the email claim is absent.
    pub async fn fetch_profile(&self, session: &SessionState) -> Result<Profile, ProviderError> {
        let url = self
            .data
            .profile_url
            .as_ref()
            .ok_or_else(|| ProviderError::Config("profile_url not set".to_string()))?;
        let json = get_json_bearer(&self.data, url, &session.access_token).await?;

        let email = claim_str(&json, &self.data.email_claim).ok_or_else(|| {
            ProviderError::Token(format!("claim '{}' missing from profile", self.data.email_claim))
        })?;
        let user = claim_str(&json, &self.data.user_claim).unwrap_or_default();
        let groups = claim_path(&json, &self.data.groups_claim)
            .map(parse_groups)
            .unwrap_or_default();

        Ok(Profile { email, user, groups })
    }
}

fn claim_str(json: &Value, path: &str) -> Option<String> {
    claim_path(json, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[async_trait]
impl Provider for OAuth2Provider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    async fn redeem(
        &self,
        redirect_uri: &str,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<SessionState, ProviderError> {
        if code.is_empty() {
            return Err(ProviderError::MissingCode);
        }

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("client_id", self.data.client_id.clone()),
            ("client_secret", self.data.secret().to_string()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier.to_string()));
        }
        if let Some(resource) = &self.data.protected_resource {
            form.push(("resource", resource.to_string()));
        }

        let request = self.data.client.post(self.data.redeem_url.clone()).form(&form);
        let token = post_token_form(&self.data, request).await?;
        debug!(provider = %self.data.name, "redeemed authorization code");
        token.into_session()
    }

    async fn refresh(&self, session: &SessionState) -> Result<SessionState, ProviderError> {
        if session.refresh_token.is_empty() {
            return Err(ProviderError::Unsupported("refresh without a refresh token"));
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", session.refresh_token.as_str()),
            ("client_id", self.data.client_id.as_str()),
            ("client_secret", self.data.secret()),
        ];
        let request = self.data.client.post(self.data.redeem_url.clone()).form(&form);
        let token = post_token_form(&self.data, request).await?;

        let mut refreshed = token.refresh(session)?;
        if self.data.profile_url.is_some() {
            self.enrich_session(&mut refreshed).await?;
        } else {
            refreshed.email.clone_from(&session.email);
            refreshed.user.clone_from(&session.user);
            refreshed.groups.clone_from(&session.groups);
        }
        debug!(provider = %self.data.name, email = %refreshed.email, "refreshed session");
        Ok(refreshed)
    }

    async fn get_email_address(&self, session: &SessionState) -> Result<String, ProviderError> {
        Ok(self.fetch_profile(session).await?.email)
    }

    async fn enrich_session(&self, session: &mut SessionState) -> Result<(), ProviderError> {
        let profile = self.fetch_profile(session).await?;
        session.email = profile.email;
        session.user = profile.user;
        session.set_groups(profile.groups);
        Ok(())
    }
}

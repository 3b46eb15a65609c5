//! Static per-provider configuration.

use authgate_core::config::ProviderConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

use crate::traits::ProviderError;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client credentials, endpoints, and claim names for one provider.
///
/// Immutable once the provider is constructed.
#[derive(Debug)]
pub struct ProviderData {
    /// Display name.
    pub name: String,
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: SecretString,
    /// Authorization endpoint.
    pub login_url: Url,
    /// Token endpoint.
    pub redeem_url: Url,
    /// Profile endpoint.
    pub profile_url: Option<Url>,
    /// Token validation endpoint.
    pub validate_url: Option<Url>,
    /// Requested scope.
    pub scope: String,
    /// Claim holding the email address.
    pub email_claim: String,
    /// Claim holding group memberships.
    pub groups_claim: String,
    /// Claim holding the username.
    pub user_claim: String,
    /// Skip token validation for providers that cannot support it.
    pub no_validate: bool,
    /// Resource indicator sent on redeem.
    pub protected_resource: Option<Url>,
    pub(crate) client: Client,
}

impl ProviderData {
    /// Build provider data from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if a required URL is missing or any URL fails to parse.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let login_url = required_url("login_url", config.login_url.as_deref())?;
        let redeem_url = required_url("redeem_url", config.redeem_url.as_deref())?;

        Ok(Self {
            name: config.name.clone().unwrap_or_default(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            login_url,
            redeem_url,
            profile_url: optional_url("profile_url", config.profile_url.as_deref())?,
            validate_url: optional_url("validate_url", config.validate_url.as_deref())?,
            scope: config.scope.clone().unwrap_or_default(),
            email_claim: config.email_claim.clone(),
            groups_claim: config.groups_claim.clone(),
            user_claim: config.user_claim.clone(),
            no_validate: config.skip_validation,
            protected_resource: optional_url(
                "protected_resource",
                config.protected_resource.as_deref(),
            )?,
            client: http_client()?,
        })
    }

    /// Build provider data from endpoints alone, with default claim names.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        login_url: Url,
        redeem_url: Url,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: String::new(),
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            login_url,
            redeem_url,
            profile_url: None,
            validate_url: None,
            scope: String::new(),
            email_claim: "email".to_string(),
            groups_claim: "groups".to_string(),
            user_claim: "sub".to_string(),
            no_validate: false,
            protected_resource: None,
            client: http_client()?,
        })
    }

    /// Set the profile endpoint.
    #[must_use]
    pub fn with_profile_url(mut self, url: Url) -> Self {
        self.profile_url = Some(url);
        self
    }

    /// Set the validate endpoint.
    #[must_use]
    pub fn with_validate_url(mut self, url: Url) -> Self {
        self.validate_url = Some(url);
        self
    }

    /// Fill in name and scope where configuration left them empty.
    pub fn set_defaults(&mut self, name: &str, scope: &str) {
        if self.name.is_empty() {
            self.name = name.to_string();
        }
        if self.scope.is_empty() {
            self.scope = scope.to_string();
        }
    }

    /// Expose the client secret for a request.
    pub(crate) fn secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Authorization URL with the standard OAuth2 parameters.
    ///
    /// Works on a copy of the configured login URL. Its own query parameters
    /// are kept unless overridden; `extra` parameters are appended last.
    #[must_use]
    pub fn login_url(&self, redirect_uri: &str, state: &str, extra: &[(String, String)]) -> Url {
        let mut url = self.login_url.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(k, _)| !matches!(k.as_str(), "redirect_uri" | "client_id" | "response_type"))
            .collect();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (k, v) in &kept {
                query.append_pair(k, v);
            }
            query
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", &self.scope)
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("state", state);
            for (k, v) in extra {
                query.append_pair(k, v);
            }
        }
        url
    }
}

fn http_client() -> Result<Client, ProviderError> {
    Ok(Client::builder().timeout(DEFAULT_HTTP_TIMEOUT).build()?)
}

fn required_url(field: &str, value: Option<&str>) -> Result<Url, ProviderError> {
    optional_url(field, value)?.ok_or_else(|| ProviderError::Config(format!("{field} not set")))
}

fn optional_url(field: &str, value: Option<&str>) -> Result<Option<Url>, ProviderError> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => Url::parse(raw)
            .map(Some)
            .map_err(|e| ProviderError::Config(format!("invalid {field} '{raw}': {e}"))),
    }
}

//! # authgate Providers
//!
//! Identity provider clients: login URLs, code redemption, refresh, session
//! validation, identity extraction, and request authorization.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod data;
pub mod groups;
pub mod oauth2;
pub mod passport;
pub mod request;
pub mod traits;

pub use acl::AuthorizationTable;
pub use data::ProviderData;
pub use groups::GroupCache;
pub use oauth2::OAuth2Provider;
pub use passport::{PassportConfig, PassportProvider};
pub use traits::{Provider, ProviderError};

use authgate_core::config::{ProviderConfig, ProviderType};
use authgate_core::{AuthMetrics, SessionState};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the configured provider.
///
/// # Errors
///
/// Returns error if required URLs or passport files are missing or invalid.
pub fn new_provider(
    config: &ProviderConfig,
    groups: Arc<GroupCache>,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let data = ProviderData::from_config(config)?;
    let provider: Arc<dyn Provider> = match config.provider_type {
        ProviderType::OAuth2 => Arc::new(OAuth2Provider::new(data)),
        ProviderType::Passport => {
            let files = config
                .passport
                .as_ref()
                .ok_or_else(|| ProviderError::Config("passport files not set".to_string()))?;
            Arc::new(PassportProvider::new(data, &files.into())?.with_group_cache(groups))
        }
    };
    info!(provider = provider.name(), "Initialized identity provider");
    Ok(provider)
}

/// Finish the OAuth callback: redeem the code, then fill in identity.
///
/// Upstream failures increment the callback-failure counter for `method`.
///
/// # Errors
///
/// Returns error if redemption or identity lookup fails.
pub async fn complete_login(
    provider: &dyn Provider,
    metrics: &AuthMetrics,
    method: &str,
    redirect_uri: &str,
    code: &str,
    code_verifier: Option<&str>,
) -> Result<SessionState, ProviderError> {
    let result = async {
        let mut session = provider.redeem(redirect_uri, code, code_verifier).await?;
        provider.enrich_session(&mut session).await?;
        Ok::<_, ProviderError>(session)
    }
    .await;

    if let Err(e) = &result {
        warn!(provider = provider.name(), "Callback failed: {e}");
        metrics.callback_failed(method);
    }
    result
}

//! Print the provider authorization URL.

use anyhow::{Context, Result};
use authgate_core::Config;
use authgate_providers::{GroupCache, new_provider};
use std::path::Path;
use std::sync::Arc;

use super::load_config;

/// Login URL command arguments.
#[derive(Debug, Clone, Default)]
pub struct LoginUrlArgs {
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    /// Opaque state value.
    pub state: String,
    /// OIDC nonce, omitted when empty.
    pub nonce: String,
    /// Extra `key=value` query parameters.
    pub params: Vec<String>,
}

/// Split `key=value` arguments.
///
/// # Errors
///
/// Returns error if an argument has no `=`.
pub fn parse_params(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|p| {
            p.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| format!("invalid parameter {p:?}, expected key=value"))
        })
        .collect()
}

/// Build the login URL for the provider in `config`.
///
/// # Errors
///
/// Returns error if the provider cannot be built or a parameter is malformed.
pub fn login_url(config: &Config, args: &LoginUrlArgs) -> Result<String> {
    let provider = new_provider(&config.provider, Arc::new(GroupCache::new()))?;
    let extra = parse_params(&args.params)?;
    Ok(provider
        .get_login_url(&args.redirect_uri, &args.state, &args.nonce, &extra)
        .to_string())
}

/// Print the login URL for the configured provider.
///
/// # Errors
///
/// Returns error if the configuration or provider is invalid.
pub fn run_login_url(config_path: Option<&Path>, args: &LoginUrlArgs) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}", login_url(&config, args)?);
    Ok(())
}

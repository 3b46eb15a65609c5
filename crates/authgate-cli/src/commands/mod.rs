//! CLI command implementations.

pub mod config;
pub mod hash_password;
pub mod login_url;
pub mod secret;
pub mod session;

pub use config::run_config_validate;
pub use hash_password::run_hash_password;
pub use login_url::run_login_url;
pub use secret::run_secret;
pub use session::run_session_inspect;

use anyhow::Context;
use authgate_core::Config;
use std::path::Path;
use tracing::debug;

/// Load the configuration from `path`, or from the default location.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = path.map_or_else(Config::default_path, Path::to_path_buf);
    debug!(path = %path.display(), "Loading configuration");
    Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

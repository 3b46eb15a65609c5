//! Configuration validation command.

use crate::ui;
use anyhow::Result;
use authgate_core::{BasicAuthenticator, Config};
use authgate_providers::{GroupCache, new_provider};
use authgate_sessions::new_session_store;
use std::path::Path;
use std::sync::Arc;

/// Validate the configuration and build every component it describes.
///
/// # Errors
///
/// Returns error if any check fails.
pub async fn run_config_validate(path: Option<&Path>) -> Result<()> {
    let path = path.map_or_else(Config::default_path, Path::to_path_buf);
    ui::header("Validating Configuration");
    ui::kv("File", &path.display().to_string());

    let config = match Config::load(&path) {
        Ok(config) => {
            ui::success("Schema: configuration is valid");
            config
        }
        Err(e) => {
            ui::error(&format!("Schema error: {e}"));
            anyhow::bail!("configuration is invalid");
        }
    };

    let mut failures = 0;

    match new_provider(&config.provider, Arc::new(GroupCache::new())) {
        Ok(provider) => ui::success(&format!("Provider: {}", provider.name())),
        Err(e) => {
            ui::error(&format!("Provider: {e}"));
            failures += 1;
        }
    }

    match new_session_store(&config).await {
        Ok(store) => ui::success(&format!("Session store: {}", store.name())),
        Err(e) => {
            ui::error(&format!("Session store: {e}"));
            failures += 1;
        }
    }

    if let Some(basic) = &config.basic_auth {
        match BasicAuthenticator::load(&basic.users_file) {
            Ok(users) if users.is_empty() => {
                ui::warning(&format!("Basic auth: {} has no users", basic.users_file.display()));
            }
            Ok(users) => ui::success(&format!("Basic auth: {} users", users.len())),
            Err(e) => {
                ui::error(&format!("Basic auth: {e}"));
                failures += 1;
            }
        }
    }

    if config.cookie.domains.is_empty() {
        ui::info("Cookie domain: host-only");
    } else {
        ui::kv("Cookie domains", &config.cookie.domains.join(", "));
    }

    if failures > 0 {
        anyhow::bail!("{failures} check(s) failed");
    }
    Ok(())
}

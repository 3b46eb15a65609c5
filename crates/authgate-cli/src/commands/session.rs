//! Decode a session cookie and show who it belongs to.

use crate::ui;
use anyhow::Result;
use authgate_core::{CookieJar, SessionState};
use authgate_sessions::new_session_store;
use serde_json::{Value, json};
use std::path::Path;

use super::load_config;

/// Redacted view of a session. Tokens are reported only as present or absent.
#[must_use]
pub fn summarize(session: &SessionState) -> Value {
    json!({
        "email": session.email,
        "user": session.user,
        "preferredUsername": session.preferred_username,
        "groups": session.groups,
        "createdAt": session.created_at.to_rfc3339(),
        "expiresOn": session.expires_on.map(|t| t.to_rfc3339()),
        "expired": session.is_expired(),
        "accessToken": !session.access_token.is_empty(),
        "idToken": !session.id_token.is_empty(),
        "refreshToken": !session.refresh_token.is_empty(),
    })
}

/// Load the session referenced by a raw `Cookie` header and print it.
///
/// # Errors
///
/// Returns error if the configuration or store is unusable.
pub async fn run_session_inspect(config_path: Option<&Path>, cookie: &str, as_json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = new_session_store(&config).await?;
    let jar = CookieJar::from_cookie_header(cookie);

    let Some(session) = store.load(&jar).await? else {
        ui::warning("No valid session in cookie");
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summarize(&session))?);
        return Ok(());
    }

    ui::header("Session");
    ui::kv("Store", store.name());
    ui::kv("Email", &session.email);
    ui::kv("User", &session.user);
    if !session.preferred_username.is_empty() {
        ui::kv("Preferred username", &session.preferred_username);
    }
    ui::kv("Groups", &session.groups.join(", "));
    ui::kv("Created", &session.created_at.to_rfc3339());
    ui::kv("Expires", &describe_expiry(&session));
    ui::kv("Refresh token", if session.refresh_token.is_empty() { "no" } else { "yes" });
    Ok(())
}

/// Human-readable expiry of `session`.
#[must_use]
pub fn describe_expiry(session: &SessionState) -> String {
    match (session.expires_on, session.expires_in()) {
        (Some(at), Some(left)) if left.num_seconds() > 0 => {
            format!("{} (in {}s)", at.to_rfc3339(), left.num_seconds())
        }
        (Some(at), _) => format!("{} (expired)", at.to_rfc3339()),
        (None, _) => "never".to_string(),
    }
}

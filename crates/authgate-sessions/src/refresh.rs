//! Refresh policy shared by every session store.

use authgate_core::SessionState;
use authgate_providers::Provider;
use std::time::Duration;
use tracing::{debug, warn};

/// Whether `session` should be refreshed before use.
///
/// A session is due when its access token has expired, or when `refresh_after`
/// is set and the session is older than that.
#[must_use]
pub fn needs_refresh(session: &SessionState, refresh_after: Option<Duration>) -> bool {
    if session.is_expired() {
        return true;
    }
    refresh_after
        .and_then(|period| chrono::Duration::from_std(period).ok())
        .is_some_and(|period| session.age() > period)
}

/// Result of asking the provider to refresh a session.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Provider issued new tokens and the session validated. Save it.
    Refreshed(SessionState),
    /// Provider cannot refresh but the session is still usable.
    Keep,
    /// Session is no longer usable. Clear it.
    Drop,
}

/// Refresh `session` through `provider` and decide what to do with the result.
pub async fn refresh_session(provider: &dyn Provider, session: &SessionState) -> RefreshOutcome {
    match provider.refresh(session).await {
        Ok(refreshed) => {
            if provider.validate_session(&refreshed).await {
                debug!(provider = provider.name(), user = %refreshed.email, "Refreshed session");
                RefreshOutcome::Refreshed(refreshed)
            } else {
                warn!(provider = provider.name(), user = %refreshed.email, "Refreshed session failed validation");
                RefreshOutcome::Drop
            }
        }
        Err(e) if e.is_unsupported() => {
            if session.is_expired() {
                debug!(provider = provider.name(), "Session expired and cannot be refreshed");
                RefreshOutcome::Drop
            } else {
                RefreshOutcome::Keep
            }
        }
        Err(e) => {
            warn!(provider = provider.name(), user = %session.email, "Refresh failed: {e}");
            RefreshOutcome::Drop
        }
    }
}

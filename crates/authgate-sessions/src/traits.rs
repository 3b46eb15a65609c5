//! Session store contract seen by request handlers.

use async_trait::async_trait;
use authgate_core::{CookieJar, SessionState};
use authgate_providers::Provider;

use crate::error::SessionError;

/// Loads, saves, and refreshes the session attached to a request's cookies.
///
/// A tampered or expired cookie is never an error here: it loads as `None`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Persist `session` and queue the cookies that reference it.
    async fn save(&self, jar: &mut CookieJar, session: &SessionState) -> Result<(), SessionError>;

    /// Read the session referenced by the request cookies.
    async fn load(&self, jar: &CookieJar) -> Result<Option<SessionState>, SessionError>;

    /// Remove the session and expire its cookies. Succeeds when nothing is stored.
    async fn clear(&self, jar: &mut CookieJar) -> Result<(), SessionError>;

    /// Load the session, refreshing it through `provider` when due.
    ///
    /// Returns `Ok(None)` when there is no usable session. A refresh failure
    /// clears the session. [`SessionError::LockTimeout`] means a concurrent
    /// refresh did not finish in time and the request may be retried.
    async fn load_and_refresh(
        &self,
        jar: &mut CookieJar,
        provider: &dyn Provider,
    ) -> Result<Option<SessionState>, SessionError>;
}

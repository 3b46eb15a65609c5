//! Session store that keeps the whole session in the client cookie.
//!
//! There is no server state and no lock. Concurrent refreshes from two tabs
//! each produce a valid session and the last response written wins.

use async_trait::async_trait;
use authgate_core::{CodecError, CookieCodec, CookieJar, ErrorKind, SessionState};
use authgate_providers::Provider;
use std::time::Duration;
use tracing::warn;

use crate::error::SessionError;
use crate::refresh::{RefreshOutcome, needs_refresh, refresh_session};
use crate::traits::SessionStore;

/// Cookie-backed session store.
#[derive(Debug)]
pub struct CookieSessionStore {
    codec: CookieCodec,
    refresh_after: Option<Duration>,
}

impl CookieSessionStore {
    /// Create a store writing through `codec`, refreshing per its cookie settings.
    #[must_use]
    pub fn new(codec: CookieCodec) -> Self {
        let refresh_after = codec.config().refresh();
        Self {
            codec,
            refresh_after,
        }
    }

    /// Cookie codec in use.
    #[must_use]
    pub const fn codec(&self) -> &CookieCodec {
        &self.codec
    }

    fn decode(&self, jar: &CookieJar) -> Result<Option<SessionState>, CodecError> {
        match self.codec.load(jar) {
            Err(e) if e.kind() == ErrorKind::TamperedOrExpired => {
                warn!(cookie = self.codec.name(), "Discarding session cookie: {e}");
                Ok(None)
            }
            other => other,
        }
    }
}

#[async_trait]
impl SessionStore for CookieSessionStore {
    fn name(&self) -> &'static str {
        "cookie"
    }

    async fn save(&self, jar: &mut CookieJar, session: &SessionState) -> Result<(), SessionError> {
        self.codec.save(jar, session)?;
        Ok(())
    }

    async fn load(&self, jar: &CookieJar) -> Result<Option<SessionState>, SessionError> {
        Ok(self.decode(jar)?)
    }

    async fn clear(&self, jar: &mut CookieJar) -> Result<(), SessionError> {
        self.codec.clear(jar);
        Ok(())
    }

    async fn load_and_refresh(
        &self,
        jar: &mut CookieJar,
        provider: &dyn Provider,
    ) -> Result<Option<SessionState>, SessionError> {
        let Some(session) = self.decode(jar)? else {
            if self.codec.is_present(jar) {
                // a cookie was sent but did not decode
                self.codec.clear(jar);
            }
            return Ok(None);
        };
        if !needs_refresh(&session, self.refresh_after) {
            return Ok(Some(session));
        }

        match refresh_session(provider, &session).await {
            RefreshOutcome::Refreshed(refreshed) => {
                self.codec.save(jar, &refreshed)?;
                Ok(Some(refreshed))
            }
            RefreshOutcome::Keep => Ok(Some(session)),
            RefreshOutcome::Drop => {
                self.codec.clear(jar);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, expired_session, fresh_session};
    use authgate_core::config::{CookieConfig, SecretString};
    use pretty_assertions::assert_eq;

    fn store(refresh_secs: u64) -> CookieSessionStore {
        CookieSessionStore::new(
            CookieCodec::new(CookieConfig {
                secret: SecretString::from("cookie store secret"),
                refresh_secs,
                ..CookieConfig::default()
            })
            .unwrap(),
        )
    }

    async fn saved_jar(store: &CookieSessionStore, session: &SessionState) -> CookieJar {
        let mut jar = CookieJar::new();
        store.save(&mut jar, session).await.unwrap();
        jar.next_request()
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = store(0);
        let session = fresh_session();
        let jar = saved_jar(&store, &session).await;
        assert_eq!(store.load(&jar).await.unwrap(), Some(session));

        let mut jar = jar;
        store.clear(&mut jar).await.unwrap();
        assert_eq!(store.load(&jar.next_request()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tampered_cookie_loads_as_none() {
        let store = store(0);
        let jar = CookieJar::from_cookie_header("_authgate=bm90LWEtc2Vzc2lvbg");
        assert_eq!(store.load(&jar).await.unwrap(), None);

        let mut jar = jar;
        let provider = FakeProvider::new();
        assert_eq!(store.load_and_refresh(&mut jar, &provider).await.unwrap(), None);
        // the bad cookie is expired in the response
        assert_eq!(jar.response_cookies().len(), 1);
        assert_eq!(provider.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_chunk_set_is_cleared() {
        let store = store(0);
        let provider = FakeProvider::new();

        let mut jar = CookieJar::from_cookie_header("_authgate=a; _authgate=b");
        assert_eq!(store.load_and_refresh(&mut jar, &provider).await.unwrap(), None);
        let names: Vec<_> = jar.response_cookies().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["_authgate"]);

        let mut jar = CookieJar::from_cookie_header("_authgate=a; _authgate_2=c");
        assert_eq!(store.load_and_refresh(&mut jar, &provider).await.unwrap(), None);
        let names: Vec<_> = jar.response_cookies().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["_authgate", "_authgate_1", "_authgate_2"]);
        assert!(jar.response_cookies().iter().all(|c| c.value().is_empty()));

        // unrelated cookies leave the response alone
        let mut jar = CookieJar::from_cookie_header("other=1");
        assert_eq!(store.load_and_refresh(&mut jar, &provider).await.unwrap(), None);
        assert!(jar.response_cookies().is_empty());
        assert_eq!(provider.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_session_not_refreshed() {
        let store = store(0);
        let provider = FakeProvider::new();
        let mut jar = saved_jar(&store, &fresh_session()).await;

        let loaded = store.load_and_refresh(&mut jar, &provider).await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(provider.refresh_count(), 0);
        assert!(jar.response_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_refreshed_and_rewritten() {
        let store = store(0);
        let provider = FakeProvider::new();
        let mut jar = saved_jar(&store, &expired_session()).await;

        let loaded = store.load_and_refresh(&mut jar, &provider).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "refreshed-1");
        assert_eq!(provider.refresh_count(), 1);

        let reloaded = store.load(&jar.next_request()).await.unwrap().unwrap();
        assert_eq!(reloaded.access_token, "refreshed-1");
    }

    #[tokio::test]
    async fn test_refresh_failure_clears() {
        let store = store(0);
        let provider = FakeProvider::failing();
        let mut jar = saved_jar(&store, &expired_session()).await;

        assert_eq!(store.load_and_refresh(&mut jar, &provider).await.unwrap(), None);
        assert_eq!(store.load(&jar.next_request()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsupported_refresh_keeps_old_session() {
        let store = store(60);
        let provider = FakeProvider::unsupported();
        let mut session = fresh_session();
        session.created_at -= chrono::Duration::minutes(5);
        let mut jar = saved_jar(&store, &session).await;

        let loaded = store.load_and_refresh(&mut jar, &provider).await.unwrap();
        assert_eq!(loaded, Some(session));
        assert_eq!(provider.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_refresh_drops_expired_session() {
        let store = store(0);
        let provider = FakeProvider::unsupported();
        let mut jar = saved_jar(&store, &expired_session()).await;

        assert_eq!(store.load_and_refresh(&mut jar, &provider).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_refreshed_session_dropped() {
        let store = store(0);
        let provider = FakeProvider::new().rejecting_validation();
        let mut jar = saved_jar(&store, &expired_session()).await;

        assert_eq!(store.load_and_refresh(&mut jar, &provider).await.unwrap(), None);
        assert_eq!(provider.refresh_count(), 1);
    }
}

//! # authgate Sessions
//!
//! Session persistence for authgate.
//!
//! Two kinds of session store sit behind [`SessionStore`]:
//! - [`CookieSessionStore`]: the sealed session lives in the client cookie
//! - [`PersistenceManager`]: the cookie holds a [`Ticket`] and the session
//!   lives in a [`Store`] ([`SledStore`], [`MemoryStore`], or `RedisStore`
//!   with the `redis` feature), with lock-coordinated refresh

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cookie_store;
pub mod error;
pub mod factory;
pub mod manager;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod refresh;
pub mod sled_store;
pub mod store;
pub mod ticket;
pub mod traits;

pub use cookie_store::CookieSessionStore;
pub use error::SessionError;
pub use factory::new_session_store;
pub use manager::{ManagerOptions, PersistenceManager};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use refresh::{RefreshOutcome, needs_refresh, refresh_session};
pub use sled_store::SledStore;
pub use store::{LockHandle, Store, StoreError};
pub use ticket::Ticket;
pub use traits::SessionStore;

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use authgate_core::SessionState;
    use authgate_providers::{Provider, ProviderData, ProviderError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    #[derive(Clone, Copy)]
    enum Mode {
        Succeed,
        Fail,
        Unsupported,
    }

    /// Provider whose refresh behavior is scripted and counted.
    pub struct FakeProvider {
        data: ProviderData,
        mode: Mode,
        valid: bool,
        delay: Duration,
        refreshes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// Decrements the in-flight count when a refresh ends or is cancelled.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FakeProvider {
        fn with_mode(mode: Mode) -> Self {
            let data = ProviderData::new(
                "client",
                "secret",
                Url::parse("https://idp.test/authorize").unwrap(),
                Url::parse("https://idp.test/token").unwrap(),
            )
            .unwrap();
            Self {
                data,
                mode,
                valid: true,
                delay: Duration::ZERO,
                refreshes: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn new() -> Self {
            Self::with_mode(Mode::Succeed)
        }

        pub fn failing() -> Self {
            Self::with_mode(Mode::Fail)
        }

        pub fn unsupported() -> Self {
            Self::with_mode(Mode::Unsupported)
        }

        pub fn rejecting_validation(mut self) -> Self {
            self.valid = false;
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn refresh_count(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }

        /// Most refreshes ever running at the same time.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn data(&self) -> &ProviderData {
            &self.data
        }

        async fn redeem(
            &self,
            _redirect_uri: &str,
            _code: &str,
            _code_verifier: Option<&str>,
        ) -> Result<SessionState, ProviderError> {
            Ok(SessionState::with_tokens("redeemed", ""))
        }

        async fn refresh(&self, session: &SessionState) -> Result<SessionState, ProviderError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.mode {
                Mode::Succeed => {
                    let mut refreshed = session.clone();
                    refreshed.access_token = format!("refreshed-{n}");
                    refreshed.created_at = chrono::Utc::now();
                    refreshed.set_expires_in(3600);
                    Ok(refreshed)
                }
                Mode::Fail => Err(ProviderError::Upstream {
                    endpoint: "https://idp.test/token".to_string(),
                    status: 400,
                    body: "invalid_grant".to_string(),
                }),
                Mode::Unsupported => Err(ProviderError::Unsupported("refresh")),
            }
        }

        async fn validate_session(&self, _session: &SessionState) -> bool {
            self.valid
        }

        async fn get_email_address(&self, session: &SessionState) -> Result<String, ProviderError> {
            Ok(session.email.clone())
        }
    }

    pub fn fresh_session() -> SessionState {
        let mut session = SessionState::with_tokens("access", "id");
        session.refresh_token = "refresh".to_string();
        session.email = "user@example.com".to_string();
        session.user = "user".to_string();
        session.set_expires_in(3600);
        session
    }

    pub fn expired_session() -> SessionState {
        let mut session = fresh_session();
        session.set_expires_in(-60);
        session
    }
}

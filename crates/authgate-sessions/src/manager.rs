//! Server-side session persistence with coordinated refresh.
//!
//! The client cookie holds a sealed [`Ticket`]. The session itself lives in a
//! [`Store`] under the ticket's key, encrypted with the ticket's own secret.
//!
//! Refresh runs under the store's advisory lock so that at most one refresh
//! per ticket is in flight across every process sharing the store. A refresh
//! is abandoned when the lock lapses, and its result is written only while the
//! lock is still held. Callers that find the lock taken poll the store until
//! the holder's result appears or the wait deadline passes.

use async_trait::async_trait;
use authgate_core::{Config, CookieCodec, CookieJar, ErrorKind, SessionState};
use authgate_providers::Provider;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::refresh::{RefreshOutcome, needs_refresh, refresh_session};
use crate::store::{LockHandle, Store, StoreError};
use crate::ticket::Ticket;
use crate::traits::SessionStore;

/// Session lifetime in the store when the cookie has no expiry.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Timing knobs for [`PersistenceManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// How long a saved session lives in the store.
    pub ttl: Duration,
    /// Lifetime of a refresh lock that is never released. A refresh that
    /// has not finished within nine tenths of it is abandoned.
    pub lock_ttl: Duration,
    /// How long to wait for another holder's refresh.
    pub lock_wait: Duration,
    /// Pause between polls while waiting.
    pub retry_interval: Duration,
    /// Refresh sessions older than this, in addition to expired ones.
    pub refresh_after: Option<Duration>,
}

impl ManagerOptions {
    /// Options taken from the cookie and session sections of `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.cookie.expire().unwrap_or(DEFAULT_SESSION_TTL),
            lock_ttl: config.session.lock_ttl(),
            lock_wait: config.session.lock_wait(),
            retry_interval: config.session.retry_interval(),
            refresh_after: config.cookie.refresh(),
        }
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            lock_ttl: Duration::from_secs(5),
            lock_wait: Duration::from_secs(7),
            retry_interval: Duration::from_millis(50),
            refresh_after: None,
        }
    }
}

/// Session store backed by a server-side [`Store`].
#[derive(Debug)]
pub struct PersistenceManager<S> {
    store: S,
    codec: CookieCodec,
    options: ManagerOptions,
}

impl<S: Store> PersistenceManager<S> {
    /// Wrap `store`, sealing ticket cookies with `codec`.
    #[must_use]
    pub fn new(store: S, codec: CookieCodec, options: ManagerOptions) -> Self {
        Self {
            store,
            codec,
            options,
        }
    }

    /// Backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Timing options in effect.
    #[must_use]
    pub const fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Read the ticket from the request cookies.
    ///
    /// # Errors
    ///
    /// Returns error if the ticket cookie is present but tampered or malformed.
    pub fn ticket(&self, jar: &CookieJar) -> Result<Option<Ticket>, SessionError> {
        let Some(values) = self.codec.collect_chunks(jar)? else {
            return Ok(None);
        };
        Ticket::from_cookie_value(&self.codec, &values.concat()).map(Some)
    }

    fn ticket_or_discard(&self, jar: &CookieJar) -> Result<Option<Ticket>, SessionError> {
        match self.ticket(jar) {
            Err(e) if e.kind() == ErrorKind::TamperedOrExpired => {
                warn!(cookie = self.codec.name(), "Discarding session ticket: {e}");
                Ok(None)
            }
            other => other,
        }
    }

    async fn load_ticket(&self, ticket: &Ticket) -> Result<Option<SessionState>, SessionError> {
        let key = ticket.store_key();
        let Some(blob) = self.store.load(&key).await? else {
            debug!(key = %key, "No stored session");
            return Ok(None);
        };
        match ticket.open(&blob) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(key = %key, "Discarding stored session: {e}");
                Ok(None)
            }
        }
    }

    async fn save_ticket(
        &self,
        jar: &mut CookieJar,
        ticket: &Ticket,
        session: &SessionState,
    ) -> Result<(), SessionError> {
        let blob = ticket.seal(session)?;
        self.store
            .save(&ticket.store_key(), &blob, self.options.ttl)
            .await?;
        self.codec
            .write_values(jar, vec![ticket.to_cookie_value(&self.codec)?]);
        Ok(())
    }

    async fn clear_ticket(&self, jar: &mut CookieJar, ticket: &Ticket) -> Result<(), SessionError> {
        self.store.clear(&ticket.store_key()).await?;
        self.codec.clear(jar);
        Ok(())
    }

    async fn refresh_locked(
        &self,
        jar: &mut CookieJar,
        ticket: &Ticket,
        session: SessionState,
        provider: &dyn Provider,
    ) -> Result<Option<SessionState>, SessionError> {
        let key = ticket.store_key();
        let deadline = after(Instant::now(), self.options.lock_wait);

        loop {
            let attempt = Instant::now();
            match self.store.lock(&key, self.options.lock_ttl).await {
                Ok(lock) => {
                    // keep a tenth of the lock lifetime for writing the result
                    let held_until =
                        after(attempt, self.options.lock_ttl - self.options.lock_ttl / 10);
                    let result = self
                        .refresh_under_lock(jar, ticket, provider, &*lock, held_until)
                        .await;
                    if let Err(e) = lock.release().await {
                        warn!(key = %key, "Failed to release refresh lock: {e}");
                    }
                    return result;
                }
                Err(StoreError::LockHeld(_)) => {
                    if Instant::now() >= deadline {
                        warn!(key = %key, "Gave up waiting for concurrent refresh");
                        return Err(SessionError::LockTimeout(self.options.lock_wait));
                    }
                    sleep(self.options.retry_interval).await;
                    match self.load_ticket(ticket).await? {
                        None => return Ok(None),
                        Some(current) if !needs_refresh(&current, self.options.refresh_after) => {
                            debug!(key = %key, "Picked up concurrently refreshed session");
                            return Ok(Some(current));
                        }
                        Some(_) => {}
                    }
                }
                Err(StoreError::Unsupported(_)) => {
                    return self.apply_refresh(jar, ticket, session, provider).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn refresh_under_lock(
        &self,
        jar: &mut CookieJar,
        ticket: &Ticket,
        provider: &dyn Provider,
        lock: &dyn LockHandle,
        held_until: Instant,
    ) -> Result<Option<SessionState>, SessionError> {
        // the previous holder may have finished between our load and our lock
        let Some(current) = self.load_ticket(ticket).await? else {
            return Ok(None);
        };
        if !needs_refresh(&current, self.options.refresh_after) {
            return Ok(Some(current));
        }

        // past `held_until` another caller may take the lock and refresh too
        let Ok(outcome) = timeout_at(held_until, refresh_session(provider, &current)).await else {
            warn!(key = %lock.key(), "Refresh did not finish before its lock lapsed");
            return Err(SessionError::LockExpired(self.options.lock_ttl));
        };
        if !matches!(outcome, RefreshOutcome::Keep) && !lock.is_held().await? {
            warn!(key = %lock.key(), "Lost refresh lock, discarding refresh result");
            return Err(SessionError::LockExpired(self.options.lock_ttl));
        }
        self.apply_outcome(jar, ticket, current, outcome).await
    }

    async fn apply_refresh(
        &self,
        jar: &mut CookieJar,
        ticket: &Ticket,
        session: SessionState,
        provider: &dyn Provider,
    ) -> Result<Option<SessionState>, SessionError> {
        let outcome = refresh_session(provider, &session).await;
        self.apply_outcome(jar, ticket, session, outcome).await
    }

    async fn apply_outcome(
        &self,
        jar: &mut CookieJar,
        ticket: &Ticket,
        session: SessionState,
        outcome: RefreshOutcome,
    ) -> Result<Option<SessionState>, SessionError> {
        match outcome {
            RefreshOutcome::Refreshed(refreshed) => {
                self.save_ticket(jar, ticket, &refreshed).await?;
                Ok(Some(refreshed))
            }
            RefreshOutcome::Keep => Ok(Some(session)),
            RefreshOutcome::Drop => {
                self.clear_ticket(jar, ticket).await?;
                Ok(None)
            }
        }
    }
}

/// `start + by`, or `start` itself if that is not representable.
fn after(start: Instant, by: Duration) -> Instant {
    start.checked_add(by).unwrap_or(start)
}

#[async_trait]
impl<S: Store + 'static> SessionStore for PersistenceManager<S> {
    fn name(&self) -> &'static str {
        "persistent"
    }

    async fn save(&self, jar: &mut CookieJar, session: &SessionState) -> Result<(), SessionError> {
        let ticket = match self.ticket_or_discard(jar)? {
            Some(ticket) => ticket,
            None => Ticket::new(self.codec.name()),
        };
        self.save_ticket(jar, &ticket, session).await
    }

    async fn load(&self, jar: &CookieJar) -> Result<Option<SessionState>, SessionError> {
        match self.ticket_or_discard(jar)? {
            Some(ticket) => self.load_ticket(&ticket).await,
            None => Ok(None),
        }
    }

    async fn clear(&self, jar: &mut CookieJar) -> Result<(), SessionError> {
        if let Some(ticket) = self.ticket_or_discard(jar)? {
            self.store.clear(&ticket.store_key()).await?;
        }
        self.codec.clear(jar);
        Ok(())
    }

    async fn load_and_refresh(
        &self,
        jar: &mut CookieJar,
        provider: &dyn Provider,
    ) -> Result<Option<SessionState>, SessionError> {
        let ticket = match self.ticket(jar) {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::TamperedOrExpired => {
                warn!(cookie = self.codec.name(), "Discarding session ticket: {e}");
                self.codec.clear(jar);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(session) = self.load_ticket(&ticket).await? else {
            return Ok(None);
        };
        if !needs_refresh(&session, self.options.refresh_after) {
            return Ok(Some(session));
        }
        self.refresh_locked(jar, &ticket, session, provider).await
    }
}

//! In-process store with a controllable clock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::store::{LockHandle, Store, StoreError, lock_key, lock_token};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    offset: Mutex<Duration>,
}

impl Inner {
    fn now(&self) -> Instant {
        Instant::now() + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_live(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Store that keeps entries in memory.
///
/// Shares state across clones. [`fast_forward`](Self::fast_forward) moves the
/// store's clock so TTL behavior can be tested without sleeping.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance this store's clock by `by`.
    pub fn fast_forward(&self, by: Duration) {
        *self.inner.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Number of live entries, locks included.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.inner.now();
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether the store has no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("entries", &self.len()).finish()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save(&self, key: &str, blob: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.inner.now() + ttl;
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                Entry {
                    value: blob.to_vec(),
                    expires_at,
                },
            );
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.get_live(key))
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn lock(&self, key: &str, ttl: Duration) -> Result<Box<dyn LockHandle>, StoreError> {
        let key = lock_key(key);
        let token = lock_token();
        let now = self.inner.now();

        let mut entries = self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(&key).is_some_and(|e| e.expires_at > now) {
            return Err(StoreError::LockHeld(key));
        }
        entries.insert(
            key.clone(),
            Entry {
                value: token.clone().into_bytes(),
                expires_at: now + ttl,
            },
        );
        drop(entries);

        Ok(Box::new(MemoryLock {
            inner: self.inner.clone(),
            key,
            token,
        }))
    }
}

struct MemoryLock {
    inner: Arc<Inner>,
    key: String,
    token: String,
}

#[async_trait]
impl LockHandle for MemoryLock {
    fn key(&self) -> &str {
        &self.key
    }

    async fn is_held(&self) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .get_live(&self.key)
            .is_some_and(|v| v == self.token.as_bytes()))
    }

    async fn release(self: Box<Self>) -> Result<(), StoreError> {
        let mut entries = self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(&self.key)
            .is_some_and(|e| e.value == self.token.as_bytes())
        {
            entries.remove(&self.key);
        }
        Ok(())
    }
}

//! Embedded persistent store backed by sled.
//!
//! Values are prefixed with their expiry as 8 big-endian bytes of Unix
//! milliseconds. Expired values are dropped on read, and a background task
//! sweeps the ones nobody reads again. Locks use sled's compare-and-swap, so
//! they exclude every handle sharing the database.

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use crate::store::{LockHandle, Store, StoreError, lock_key, lock_token, ttl_millis};

const EXPIRY_LEN: usize = 8;

/// Store backed by a sled tree.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Open or create a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Backend(format!("Failed to open session database: {e}")))?;
        Self::with_db(db)
    }

    /// Create a store on an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let tree = db
            .open_tree("sessions")
            .map_err(|e| StoreError::Backend(format!("Failed to open sessions tree: {e}")))?;
        Ok(Self { db, tree })
    }

    /// Get the underlying sled database.
    #[must_use]
    pub const fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Number of entries on disk, expired ones and locks included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `every` on the tokio runtime.
    ///
    /// The task runs until aborted through the returned handle.
    pub fn spawn_purge(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + every, every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if let Err(e) = store.purge_expired() {
                    warn!("Failed to purge expired sessions: {e}");
                }
            }
        })
    }

    /// Remove every expired entry. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be scanned.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = now_millis();
        let mut removed = 0;
        for item in self.tree.iter() {
            let (key, value) = item.map_err(backend)?;
            if is_expired(&value, now) {
                // only remove if unchanged since the scan
                if self
                    .tree
                    .compare_and_swap(&key, Some(&value), None::<&[u8]>)
                    .map_err(backend)?
                    .is_ok()
                {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("entries", &self.tree.len())
            .finish()
    }
}

fn backend(e: sled::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn encode(value: &[u8], ttl: Duration) -> Vec<u8> {
    let expires = now_millis().saturating_add(ttl_millis(ttl));
    [expires.to_be_bytes().as_slice(), value].concat()
}

fn expiry(raw: &[u8]) -> u64 {
    raw.get(..EXPIRY_LEN)
        .and_then(|b| <[u8; EXPIRY_LEN]>::try_from(b).ok())
        .map_or(0, u64::from_be_bytes)
}

fn is_expired(raw: &[u8], now: u64) -> bool {
    expiry(raw) <= now
}

#[async_trait]
impl Store for SledStore {
    async fn save(&self, key: &str, blob: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.tree.insert(key, encode(blob, ttl)).map_err(backend)?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(raw) = self.tree.get(key).map_err(backend)? else {
            return Ok(None);
        };
        if is_expired(&raw, now_millis()) {
            self.tree
                .compare_and_swap(key, Some(&raw), None::<&[u8]>)
                .map_err(backend)?
                .ok();
            return Ok(None);
        }
        Ok(Some(raw[EXPIRY_LEN..].to_vec()))
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.tree.remove(key).map_err(backend)?;
        Ok(())
    }

    async fn lock(&self, key: &str, ttl: Duration) -> Result<Box<dyn LockHandle>, StoreError> {
        let key = lock_key(key);
        let token = lock_token();
        let value = encode(token.as_bytes(), ttl);

        let current = self.tree.get(&key).map_err(backend)?;
        if let Some(existing) = &current {
            if !is_expired(existing, now_millis()) {
                return Err(StoreError::LockHeld(key));
            }
        }
        // swap from exactly what we saw, so a concurrent acquirer wins or we do
        self.tree
            .compare_and_swap(&key, current, Some(value.clone()))
            .map_err(backend)?
            .map_err(|_| StoreError::LockHeld(key.clone()))?;

        Ok(Box::new(SledLock {
            tree: self.tree.clone(),
            key,
            value,
        }))
    }
}

struct SledLock {
    tree: sled::Tree,
    key: String,
    value: Vec<u8>,
}

#[async_trait]
impl LockHandle for SledLock {
    fn key(&self) -> &str {
        &self.key
    }

    async fn is_held(&self) -> Result<bool, StoreError> {
        let current = self.tree.get(&self.key).map_err(backend)?;
        Ok(current.is_some_and(|v| *v == *self.value && !is_expired(&v, now_millis())))
    }

    async fn release(self: Box<Self>) -> Result<(), StoreError> {
        // a mismatch means the lock expired and changed hands; leave it
        self.tree
            .compare_and_swap(&self.key, Some(&self.value), None::<&[u8]>)
            .map_err(backend)?
            .ok();
        Ok(())
    }
}

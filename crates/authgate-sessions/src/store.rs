//! Raw keyed-blob storage and advisory locks.

use async_trait::async_trait;
use authgate_core::ErrorKind;
use std::time::Duration;
use thiserror::Error;

use authgate_core::cipher::random_bytes;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend failed.
    #[error("Storage error: {0}")]
    Backend(String),

    /// Someone else holds the lock.
    #[error("Lock already held: {0}")]
    LockHeld(String),

    /// The backend does not provide this operation.
    #[error("{0} is not supported by this store")]
    Unsupported(&'static str),
}

impl StoreError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend(_) | Self::Unsupported(_) => ErrorKind::Internal,
            Self::LockHeld(_) => ErrorKind::LockTimeout,
        }
    }
}

/// Keyed-blob store with per-entry TTL.
///
/// Expired entries behave exactly like absent ones.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store `blob` under `key` for `ttl`, replacing any previous value.
    async fn save(&self, key: &str, blob: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Fetch the blob under `key`, or `None` if absent or expired.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key`. Succeeds when the key is already gone.
    async fn clear(&self, key: &str) -> Result<(), StoreError>;

    /// Acquire the advisory lock for `key`, held for at most `ttl`.
    ///
    /// Fails with [`StoreError::LockHeld`] if another holder has it.
    async fn lock(&self, key: &str, ttl: Duration) -> Result<Box<dyn LockHandle>, StoreError>;
}

/// A held advisory lock.
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Key the lock protects.
    fn key(&self) -> &str;

    /// Whether this handle still owns the lock.
    async fn is_held(&self) -> Result<bool, StoreError>;

    /// Release the lock early. Does nothing if it already expired or changed owner.
    async fn release(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage key of the lock guarding `key`.
#[must_use]
pub fn lock_key(key: &str) -> String {
    format!("{key}.lock")
}

/// Random owner token for a lock.
#[must_use]
pub fn lock_token() -> String {
    hex::encode(random_bytes::<16>())
}

/// Milliseconds in `ttl`, at least 1.
#[must_use]
pub fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key() {
        assert_eq!(lock_key("_authgate-abc"), "_authgate-abc.lock");
    }

    #[test]
    fn test_lock_tokens_unique() {
        let a = lock_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, lock_token());
    }

    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}

//! Networked store backed by Redis.
//!
//! Session TTLs use `PSETEX`. Locks are `SET NX PX` with a random owner token
//! and are released by a script that deletes the key only while it still
//! holds that token.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ExistenceCheck, Script, SetExpiry, SetOptions};
use std::time::Duration;
use tracing::{debug, info};

use crate::store::{LockHandle, Store, StoreError, lock_key, lock_token, ttl_millis};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(format!("redis: {e}"))
}

/// Store backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the server at `url` (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        info!("Connected to redis session store");
        Ok(Self { conn })
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn save(&self, key: &str, blob: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, blob, ttl_millis(ttl))
            .await
            .map_err(backend)
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(backend)
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(backend)
    }

    async fn lock(&self, key: &str, ttl: Duration) -> Result<Box<dyn LockHandle>, StoreError> {
        let key = lock_key(key);
        let token = lock_token();
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::PX(ttl_millis(ttl)));

        let mut conn = self.conn.clone();
        let reply: Option<String> = conn
            .set_options(&key, &token, options)
            .await
            .map_err(backend)?;
        if reply.is_none() {
            return Err(StoreError::LockHeld(key));
        }
        debug!(key = %key, "Acquired redis lock");

        Ok(Box::new(RedisLock {
            conn: self.conn.clone(),
            key,
            token,
        }))
    }
}

struct RedisLock {
    conn: ConnectionManager,
    key: String,
    token: String,
}

#[async_trait]
impl LockHandle for RedisLock {
    fn key(&self) -> &str {
        &self.key
    }

    async fn is_held(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let current: Option<String> = conn.get(&self.key).await.map_err(backend)?;
        Ok(current.as_deref() == Some(self.token.as_str()))
    }

    async fn release(self: Box<Self>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let script = Script::new(RELEASE_SCRIPT);
        let _: i64 = script
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

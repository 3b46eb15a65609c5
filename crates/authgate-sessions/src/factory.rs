//! Build the configured session store.

use authgate_core::config::StoreType;
use authgate_core::{Config, CookieCodec};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cookie_store::CookieSessionStore;
use crate::error::SessionError;
use crate::manager::{ManagerOptions, PersistenceManager};
use crate::sled_store::SledStore;
use crate::traits::SessionStore;

/// Create the session store selected by `config.session`.
///
/// # Errors
///
/// Returns error if the cookie secret is unusable, a backend location is
/// missing, or the backend cannot be opened.
pub async fn new_session_store(config: &Config) -> Result<Arc<dyn SessionStore>, SessionError> {
    let codec = CookieCodec::new(config.cookie.clone())?;
    let options = ManagerOptions::from_config(config);

    let store: Arc<dyn SessionStore> = match config.session.store {
        StoreType::Cookie => Arc::new(CookieSessionStore::new(codec)),
        StoreType::Sled => Arc::new(sled_store(config, codec, options)?),
        StoreType::Redis => redis_store(config, codec, options).await?,
    };
    info!(store = store.name(), kind = ?config.session.store, "Initialized session store");
    Ok(store)
}

/// Open the sled store and start its expiry sweep.
fn sled_store(
    config: &Config,
    codec: CookieCodec,
    options: ManagerOptions,
) -> Result<PersistenceManager<SledStore>, SessionError> {
    let path = config
        .session
        .sled_path
        .as_ref()
        .ok_or_else(|| SessionError::Config("session.sledPath not set".to_string()))?;
    let store = SledStore::open(path)?;
    if let Some(every) = config.session.purge_interval() {
        debug!(every = ?every, "Starting expired session sweep");
        // detached: runs for the life of the runtime
        drop(store.spawn_purge(every));
    }
    Ok(PersistenceManager::new(store, codec, options))
}

#[cfg(feature = "redis")]
async fn redis_store(
    config: &Config,
    codec: CookieCodec,
    options: ManagerOptions,
) -> Result<Arc<dyn SessionStore>, SessionError> {
    let url = config
        .session
        .redis_url
        .as_deref()
        .ok_or_else(|| SessionError::Config("session.redisUrl not set".to_string()))?;
    let store = crate::redis_store::RedisStore::connect(url).await?;
    Ok(Arc::new(PersistenceManager::new(store, codec, options)))
}

#[cfg(not(feature = "redis"))]
#[allow(clippy::unused_async)]
async fn redis_store(
    _config: &Config,
    _codec: CookieCodec,
    _options: ManagerOptions,
) -> Result<Arc<dyn SessionStore>, SessionError> {
    Err(SessionError::Config(
        "redis session store requires the `redis` feature".to_string(),
    ))
}

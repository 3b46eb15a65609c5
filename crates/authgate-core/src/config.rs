//! Configuration loading and validation.
//!
//! Config is JSON5 with camelCase keys.
//! Config location: `~/.authgate/authgate.json`

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::error::ErrorKind;

pub use secrecy::SecretString;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl ConfigError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Session cookie settings.
    #[serde(default)]
    pub cookie: CookieConfig,

    /// Session storage settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Identity provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Basic-auth fallback settings.
    #[serde(default)]
    pub basic_auth: Option<BasicAuthConfig>,

    /// Whether requests arrive through a trusted reverse proxy.
    #[serde(default)]
    pub reverse_proxy: bool,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON5 or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("authgate.json")
    }

    /// Get the authgate state directory.
    ///
    /// Uses `AUTHGATE_STATE_DIR` env var if set, otherwise `~/.authgate`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("AUTHGATE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".authgate")
        } else {
            PathBuf::from(".authgate")
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cookie.validate()?;
        self.session.validate()?;
        self.provider.validate()?;
        Ok(())
    }
}

/// Longest cookie or refresh lifetime accepted, in seconds (400 days).
pub const MAX_COOKIE_LIFETIME_SECS: u64 = 400 * 24 * 3600;

/// Session cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieConfig {
    /// Base cookie name. Chunks are named `<name>_1`, `<name>_2`, ...
    #[serde(default = "default_cookie_name")]
    pub name: String,

    /// Server-held secret the session cipher key is derived from.
    #[serde(default, skip_serializing)]
    pub secret: SecretString,

    /// Candidate cookie domains, in priority order.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Cookie path.
    #[serde(default = "default_cookie_path")]
    pub path: String,

    /// Cookie and session lifetime in seconds. 0 means a browser-session cookie.
    #[serde(default = "default_cookie_expire")]
    pub expire_secs: u64,

    /// Refresh sessions older than this many seconds. 0 disables.
    #[serde(default)]
    pub refresh_secs: u64,

    /// Set the `Secure` attribute.
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Set the `HttpOnly` attribute.
    #[serde(default = "default_true")]
    pub http_only: bool,

    /// `SameSite` attribute.
    #[serde(default)]
    pub same_site: SameSiteMode,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            secret: SecretString::default(),
            domains: Vec::new(),
            path: default_cookie_path(),
            expire_secs: default_cookie_expire(),
            refresh_secs: 0,
            secure: true,
            http_only: true,
            same_site: SameSiteMode::default(),
        }
    }
}

impl CookieConfig {
    /// Cookie lifetime, `None` for browser-session cookies.
    #[must_use]
    pub const fn expire(&self) -> Option<Duration> {
        if self.expire_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.expire_secs))
        }
    }

    /// Refresh period, `None` when disabled.
    #[must_use]
    pub const fn refresh(&self) -> Option<Duration> {
        if self.refresh_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.refresh_secs))
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingField("cookie.name".to_string()));
        }
        if self
            .name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || ";=,".contains(c))
        {
            return Err(ConfigError::Validation(format!(
                "cookie.name '{}' contains invalid characters",
                self.name
            )));
        }
        if self.secret.expose_secret().is_empty() {
            return Err(ConfigError::MissingField("cookie.secret".to_string()));
        }
        for (field, value) in [
            ("cookie.expireSecs", self.expire_secs),
            ("cookie.refreshSecs", self.refresh_secs),
        ] {
            if value > MAX_COOKIE_LIFETIME_SECS {
                return Err(ConfigError::Validation(format!(
                    "{field} ({value}) exceeds the maximum of {MAX_COOKIE_LIFETIME_SECS}"
                )));
            }
        }
        if self.refresh_secs > 0 && self.expire_secs > 0 && self.refresh_secs >= self.expire_secs {
            return Err(ConfigError::Validation(format!(
                "cookie.refreshSecs ({}) must be less than cookie.expireSecs ({})",
                self.refresh_secs, self.expire_secs
            )));
        }
        Ok(())
    }
}

fn default_cookie_name() -> String {
    "_authgate".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

const fn default_cookie_expire() -> u64 {
    7 * 24 * 3600
}

const fn default_true() -> bool {
    true
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSiteMode {
    /// `SameSite=Lax`.
    #[default]
    Lax,
    /// `SameSite=Strict`.
    Strict,
    /// `SameSite=None`.
    None,
    /// Attribute omitted.
    Unset,
}

/// Longest lock lifetime, lock wait, or retry interval accepted, in milliseconds.
pub const MAX_LOCK_TIMING_MS: u64 = 60 * 60 * 1000;

/// Which backend stores session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// Encrypted state carried in the cookie itself.
    #[default]
    Cookie,
    /// Embedded sled database on this node.
    Sled,
    /// Shared redis server.
    Redis,
}

/// Session storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Store backend.
    #[serde(default, rename = "type")]
    pub store: StoreType,

    /// Database directory for the sled store.
    #[serde(default)]
    pub sled_path: Option<PathBuf>,

    /// Connection URL for the redis store.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// How long a refresh lock lives without explicit release, in milliseconds.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_ms: u64,

    /// How long to wait for another refresh in flight, in milliseconds.
    #[serde(default = "default_lock_wait")]
    pub lock_wait_ms: u64,

    /// Delay between reload attempts while waiting, in milliseconds.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// How often the sled store sweeps expired sessions, in milliseconds. 0 disables.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: StoreType::default(),
            sled_path: None,
            redis_url: None,
            lock_ttl_ms: default_lock_ttl(),
            lock_wait_ms: default_lock_wait(),
            retry_interval_ms: default_retry_interval(),
            purge_interval_ms: default_purge_interval(),
        }
    }
}

impl SessionConfig {
    /// Lock lifetime.
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Wait ceiling for a refresh held by someone else.
    #[must_use]
    pub const fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    /// Delay between reload attempts.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Sweep period for expired sessions, `None` when disabled.
    #[must_use]
    pub const fn purge_interval(&self) -> Option<Duration> {
        if self.purge_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.purge_interval_ms))
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.store {
            StoreType::Sled if self.sled_path.is_none() => {
                return Err(ConfigError::MissingField("session.sledPath".to_string()));
            }
            StoreType::Redis if self.redis_url.as_deref().is_none_or(str::is_empty) => {
                return Err(ConfigError::MissingField("session.redisUrl".to_string()));
            }
            _ => {}
        }
        for (field, value) in [
            ("session.lockTtlMs", self.lock_ttl_ms),
            ("session.lockWaitMs", self.lock_wait_ms),
            ("session.retryIntervalMs", self.retry_interval_ms),
        ] {
            if value > MAX_LOCK_TIMING_MS {
                return Err(ConfigError::Validation(format!(
                    "{field} ({value}) exceeds the maximum of {MAX_LOCK_TIMING_MS}"
                )));
            }
        }
        if self.lock_ttl_ms == 0 {
            return Err(ConfigError::Validation(
                "session.lockTtlMs cannot be 0".to_string(),
            ));
        }
        if self.retry_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "session.retryIntervalMs cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_lock_ttl() -> u64 {
    5_000
}

const fn default_lock_wait() -> u64 {
    7_000
}

const fn default_retry_interval() -> u64 {
    50
}

const fn default_purge_interval() -> u64 {
    5 * 60 * 1000
}

/// Identity provider family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Plain OAuth2 with a bearer-authenticated profile endpoint.
    #[default]
    OAuth2,
    /// Self-contained JWT tokens with path-prefix group authorization.
    Passport,
}

/// Identity provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider family.
    #[serde(default, rename = "type")]
    pub provider_type: ProviderType,

    /// Display name override.
    #[serde(default)]
    pub name: Option<String>,

    /// OAuth2 client ID.
    #[serde(default)]
    pub client_id: String,

    /// OAuth2 client secret.
    #[serde(default, skip_serializing)]
    pub client_secret: SecretString,

    /// Authorization endpoint.
    #[serde(default)]
    pub login_url: Option<String>,

    /// Token endpoint.
    #[serde(default)]
    pub redeem_url: Option<String>,

    /// Profile (and group lookup) endpoint.
    #[serde(default)]
    pub profile_url: Option<String>,

    /// Token validation endpoint.
    #[serde(default)]
    pub validate_url: Option<String>,

    /// Requested scope; provider default if unset.
    #[serde(default)]
    pub scope: Option<String>,

    /// Claim holding the email address.
    #[serde(default = "default_email_claim")]
    pub email_claim: String,

    /// Claim holding group memberships.
    #[serde(default = "default_groups_claim")]
    pub groups_claim: String,

    /// Claim holding the username.
    #[serde(default = "default_user_claim")]
    pub user_claim: String,

    /// Skip token validation against the validate endpoint.
    #[serde(default)]
    pub skip_validation: bool,

    /// Resource indicator sent on redeem.
    #[serde(default)]
    pub protected_resource: Option<String>,

    /// Files required by the passport provider.
    #[serde(default)]
    pub passport: Option<PassportFiles>,
}

impl ProviderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingField("provider.clientId".to_string()));
        }
        if self.provider_type == ProviderType::Passport {
            for (field, value) in [
                ("provider.loginUrl", &self.login_url),
                ("provider.redeemUrl", &self.redeem_url),
                ("provider.profileUrl", &self.profile_url),
            ] {
                if value.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingField(field.to_string()));
                }
            }
            if self.passport.is_none() {
                return Err(ConfigError::MissingField("provider.passport".to_string()));
            }
        }
        Ok(())
    }
}

fn default_email_claim() -> String {
    "email".to_string()
}

fn default_groups_claim() -> String {
    "groups".to_string()
}

fn default_user_claim() -> String {
    "sub".to_string()
}

/// Externally loaded files for the passport provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportFiles {
    /// PEM-encoded RSA public key used to verify tokens.
    pub public_key_file: PathBuf,

    /// YAML mapping of path prefix to allowed groups.
    pub auth_file: PathBuf,
}

/// Basic-auth fallback configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthConfig {
    /// File of `user:argon2-hash` lines.
    pub users_file: PathBuf,
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

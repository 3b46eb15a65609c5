//! HTTP Basic authentication against a local users file.
//!
//! The file holds one `user:hash` entry per line where `hash` is an Argon2
//! PHC string. Blank lines and lines starting with `#` are skipped.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ErrorKind;
use crate::metrics::AuthMetrics;
use crate::session::SessionState;

/// Basic authentication errors.
#[derive(Error, Debug)]
pub enum BasicAuthError {
    /// Users file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Users file line is malformed.
    #[error("Invalid users file line {line}: {reason}")]
    InvalidEntry {
        /// 1-based line number.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// `Authorization` header is not well-formed Basic credentials.
    #[error("Malformed basic credentials: {0}")]
    Malformed(String),

    /// Unknown user or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password hashing failed.
    #[error("Password hashing failed: {0}")]
    Hash(String),
}

impl BasicAuthError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::InvalidEntry { .. } => ErrorKind::Config,
            Self::Malformed(_) | Self::InvalidCredentials => ErrorKind::UnknownUser,
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

/// Validates Basic credentials and counts outcomes.
#[derive(Debug, Clone, Default)]
pub struct BasicAuthenticator {
    users: HashMap<String, String>,
    metrics: AuthMetrics,
}

impl BasicAuthenticator {
    /// Load users from a file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a line is malformed.
    pub fn load(path: &Path) -> Result<Self, BasicAuthError> {
        let content = std::fs::read_to_string(path)?;
        let auth = Self::parse(&content)?;
        info!(path = %path.display(), users = auth.users.len(), "Loaded basic auth users");
        Ok(auth)
    }

    /// Parse users file content.
    ///
    /// # Errors
    ///
    /// Returns error on a line without `:` or with an invalid hash.
    pub fn parse(content: &str) -> Result<Self, BasicAuthError> {
        let mut users = HashMap::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (user, hash) = line.split_once(':').ok_or_else(|| BasicAuthError::InvalidEntry {
                line: idx + 1,
                reason: "expected user:hash".to_string(),
            })?;
            PasswordHash::new(hash).map_err(|e| BasicAuthError::InvalidEntry {
                line: idx + 1,
                reason: format!("invalid hash: {e}"),
            })?;
            users.insert(user.to_string(), hash.to_string());
        }
        Ok(Self {
            users,
            metrics: AuthMetrics::disabled(),
        })
    }

    /// Report outcomes to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: AuthMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no users are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check an `Authorization` header value for request `method`.
    ///
    /// # Errors
    ///
    /// Returns error if the header is malformed or the credentials do not match.
    pub fn authenticate(
        &self,
        authorization: &str,
        method: &str,
    ) -> Result<SessionState, BasicAuthError> {
        let result = self.check(authorization);
        match &result {
            Ok(session) => {
                debug!(user = %session.user, "Basic auth succeeded");
                self.metrics.basic_success(&session.user, method);
            }
            Err(e) => {
                debug!("Basic auth failed: {e}");
                self.metrics.basic_failed(method);
            }
        }
        result
    }

    fn check(&self, authorization: &str) -> Result<SessionState, BasicAuthError> {
        let (user, password) = parse_basic_header(authorization)?;
        let hash = self
            .users
            .get(&user)
            .ok_or(BasicAuthError::InvalidCredentials)?;
        let parsed = PasswordHash::new(hash).map_err(|e| BasicAuthError::Hash(e.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| BasicAuthError::InvalidCredentials)?;

        let mut session = SessionState::new();
        session.email.clone_from(&user);
        session.user = user;
        Ok(session)
    }
}

/// Split `Basic <base64(user:password)>` into its parts.
///
/// # Errors
///
/// Returns error if the scheme, encoding, or separator is wrong.
pub fn parse_basic_header(authorization: &str) -> Result<(String, String), BasicAuthError> {
    let (scheme, encoded) = authorization
        .trim()
        .split_once(' ')
        .ok_or_else(|| BasicAuthError::Malformed("missing scheme".to_string()))?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(BasicAuthError::Malformed(format!("unexpected scheme {scheme}")));
    }
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| BasicAuthError::Malformed(e.to_string()))?;
    let decoded = String::from_utf8(decoded).map_err(|e| BasicAuthError::Malformed(e.to_string()))?;
    let (user, password) = decoded
        .split_once(':')
        .ok_or_else(|| BasicAuthError::Malformed("missing ':' separator".to_string()))?;
    if user.is_empty() {
        return Err(BasicAuthError::Malformed("empty user".to_string()));
    }
    Ok((user.to_string(), password.to_string()))
}

/// Hash a password with Argon2id for the users file.
///
/// # Errors
///
/// Returns error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, BasicAuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| BasicAuthError::Hash(e.to_string()))
}

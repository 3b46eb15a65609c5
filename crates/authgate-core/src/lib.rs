//! # authgate Core
//!
//! Core types, cookie handling, and configuration for authgate.
//!
//! This crate provides:
//! - The `SessionState` record shared by every other component
//! - Authenticated encryption of session data (`SessionCipher`)
//! - Chunked session cookies (`CookieCodec`, `CookieJar`)
//! - Cookie-domain resolution and the per-request scope
//! - Metrics hooks, basic-auth validation, and configuration loading

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod basic;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod jar;
pub mod metrics;
pub mod scope;
pub mod session;

pub use basic::{BasicAuthError, BasicAuthenticator, hash_password};
pub use cipher::{CipherError, SessionCipher};
pub use codec::{CodecError, CookieCodec};
pub use config::{
    Config, ConfigError, CookieConfig, PassportFiles, ProviderConfig, ProviderType, SecretString,
    SessionConfig, StoreType,
};
pub use domain::{cookie_domain, effective_host, resolve_cookie_domain};
pub use error::ErrorKind;
pub use jar::CookieJar;
pub use metrics::{AuthMetrics, MetricsSink, TracingSink};
pub use scope::{Authorization, RequestScope};
pub use session::SessionState;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::CookieCodec;
    pub use crate::error::ErrorKind;
    pub use crate::jar::CookieJar;
    pub use crate::scope::RequestScope;
    pub use crate::session::SessionState;
}

//! Session layer errors.

use authgate_core::{CodecError, ErrorKind};
use authgate_providers::ProviderError;
use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Cookie or ticket could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Identity provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Another holder kept the refresh lock past the wait deadline.
    #[error("Timed out after {0:?} waiting for a concurrent refresh")]
    LockTimeout(Duration),

    /// The refresh lock lapsed before the refresh finished; nothing was written.
    #[error("Refresh outlived its {0:?} lock")]
    LockExpired(Duration),

    /// Invalid store configuration.
    #[error("Invalid session configuration: {0}")]
    Config(String),

    /// Session could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Codec(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Provider(e) => e.kind(),
            Self::LockTimeout(_) | Self::LockExpired(_) => ErrorKind::LockTimeout,
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

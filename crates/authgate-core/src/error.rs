//! Error taxonomy shared across crate boundaries.
//!
//! Every component error collapses to one of these kinds before it reaches a
//! caller in another crate, so callers never match on transport errors.

use std::fmt;

/// Classification of an authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration. Fatal at construction.
    Config,
    /// Cookie failed authentication or is past its lifetime. Treated as "no session".
    TamperedOrExpired,
    /// Identity provider answered with a non-success status.
    Upstream,
    /// Refresh coordination did not finish in time. Safe to retry.
    LockTimeout,
    /// Claims were parsed but no group membership is cached. Forces re-login.
    UnknownUser,
    /// Caller's groups do not intersect the allowed groups.
    Forbidden,
    /// Anything else (I/O, storage, serialization).
    Internal,
}

impl ErrorKind {
    /// Whether the request can simply be retried.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::LockTimeout)
    }

    /// Whether the caller should be sent back through login.
    #[must_use]
    pub const fn requires_login(self) -> bool {
        matches!(self, Self::TamperedOrExpired | Self::UnknownUser)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::TamperedOrExpired => "tampered_or_expired",
            Self::Upstream => "upstream",
            Self::LockTimeout => "lock_timeout",
            Self::UnknownUser => "unknown_user",
            Self::Forbidden => "forbidden",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

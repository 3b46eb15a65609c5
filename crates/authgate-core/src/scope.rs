//! Per-request scope shared between middleware layers.
//!
//! Stored in the request's `http::Extensions`; outer layers set the
//! reverse-proxy flag and inner layers fill in identity and authorization.

use http::Extensions;

use crate::cipher::random_bytes;
use crate::error::ErrorKind;
use crate::session::SessionState;

/// Outcome of an authorization check for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Request may proceed.
    Allowed,
    /// Request was refused for the given reason.
    Denied(ErrorKind),
}

/// State carried alongside a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    /// Request arrived through a trusted reverse proxy, so `X-Forwarded-*` headers apply.
    pub reverse_proxy: bool,

    /// Identifier used to correlate log lines.
    pub request_id: String,

    /// Session loaded for this request, if any.
    pub session: Option<SessionState>,

    /// Session must be written back before the response goes out.
    pub save_session: bool,

    /// Session must be cleared before the response goes out.
    pub clear_session: bool,

    /// Authorization decision, once made.
    pub authorization: Option<Authorization>,
}

impl RequestScope {
    /// Create a scope with a fresh request ID.
    #[must_use]
    pub fn new(reverse_proxy: bool) -> Self {
        Self {
            reverse_proxy,
            request_id: format!("{:032x}", u128::from_be_bytes(random_bytes())),
            ..Self::default()
        }
    }

    /// Fetch the scope from request extensions.
    #[must_use]
    pub fn get(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    /// Fetch the scope mutably from request extensions.
    pub fn get_mut(extensions: &mut Extensions) -> Option<&mut Self> {
        extensions.get_mut::<Self>()
    }

    /// Attach this scope to request extensions, replacing any earlier one.
    pub fn attach(self, extensions: &mut Extensions) {
        extensions.insert(self);
    }

    /// Record the loaded session.
    pub fn set_session(&mut self, session: Option<SessionState>) {
        self.session = session;
    }

    /// Whether the request was authorized.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.authorization == Some(Authorization::Allowed)
    }
}

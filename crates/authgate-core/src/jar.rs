//! Per-request cookie view.
//!
//! Holds the cookies the client sent, the `Set-Cookie` values queued for the
//! response, and the domain those response cookies target. Writes are mirrored
//! into the request view so a later read in the same request sees them.

use cookie::Cookie;
use http::{HeaderMap, HeaderValue, header};

/// Request and response cookies for one exchange.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    request: Vec<(String, String)>,
    response: Vec<Cookie<'static>>,
    domain: String,
}

impl CookieJar {
    /// Create an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every cookie from all `Cookie` headers.
    ///
    /// Repeated names are kept so duplicate chunks can be detected.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        for value in headers.get_all(header::COOKIE) {
            match value.to_str() {
                Ok(raw) => jar.add_cookie_header(raw),
                Err(e) => tracing::debug!("ignoring non-ascii cookie header: {e}"),
            }
        }
        jar
    }

    /// Parse a single raw `Cookie` header value.
    #[must_use]
    pub fn from_cookie_header(raw: &str) -> Self {
        let mut jar = Self::new();
        jar.add_cookie_header(raw);
        jar
    }

    /// Target `domain` for cookies written through this jar.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    fn add_cookie_header(&mut self, raw: &str) {
        for cookie in Cookie::split_parse(raw) {
            match cookie {
                Ok(c) => self
                    .request
                    .push((c.name().to_string(), c.value().to_string())),
                Err(e) => tracing::debug!("ignoring malformed cookie: {e}"),
            }
        }
    }

    /// Add a request cookie.
    pub fn add_request_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.request.push((name.into(), value.into()));
    }

    /// Domain response cookies are scoped to. Empty means host-only.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// First value sent for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.request
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every request cookie, in the order received.
    #[must_use]
    pub fn request_cookies(&self) -> &[(String, String)] {
        &self.request
    }

    /// Queue a response cookie and update the request view to match.
    ///
    /// A zero `Max-Age` removes the name from the request view.
    pub fn set(&mut self, cookie: Cookie<'static>) {
        let name = cookie.name().to_string();
        self.request.retain(|(n, _)| *n != name);
        if !is_removal(&cookie) {
            self.request.push((name.clone(), cookie.value().to_string()));
        }
        self.response.retain(|c| c.name() != name);
        self.response.push(cookie);
    }

    /// Cookies queued for the response.
    #[must_use]
    pub fn response_cookies(&self) -> &[Cookie<'static>] {
        &self.response
    }

    /// Encode queued cookies as `Set-Cookie` header values.
    ///
    /// Cookies that do not form a valid header value are skipped.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<HeaderValue> {
        self.response
            .iter()
            .filter_map(|c| match HeaderValue::from_str(&c.to_string()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(cookie = c.name(), "dropping unencodable cookie: {e}");
                    None
                }
            })
            .collect()
    }

    /// Append queued cookies to a response header map.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        for value in self.set_cookie_headers() {
            headers.append(header::SET_COOKIE, value);
        }
    }

    /// Build the jar a client would present on its next request.
    ///
    /// Carries over cookies this jar did not touch plus every cookie it set
    /// that is still live.
    #[must_use]
    pub fn next_request(&self) -> Self {
        Self {
            request: self.request.clone(),
            response: Vec::new(),
            domain: self.domain.clone(),
        }
    }
}

fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age().is_some_and(|age| age.is_zero() || age.is_negative())
}

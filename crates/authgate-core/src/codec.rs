//! Session cookie codec.
//!
//! A session is sealed as `{issued_at, session}` JSON with AES-256-GCM bound to
//! the cookie name, encoded URL-safe base64, and split into chunks that fit in
//! a browser cookie. Chunks are named `<name>`, `<name>_1`, `<name>_2`, ...

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::cipher::{CipherError, SessionCipher};
use crate::config::{CookieConfig, SameSiteMode};
use crate::error::ErrorKind;
use crate::jar::CookieJar;
use crate::session::SessionState;

/// Maximum characters of encoded payload per cookie. Leaves room for the name and attributes.
pub const MAX_CHUNK_SIZE: usize = 3800;

// Bound parsed chunk indices so crafted requests cannot force large cleanup loops.
const MAX_CHUNK_INDEX: usize = 63;

/// Cookie codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Payload failed authentication, decoding, or parsing.
    #[error("Tampered session cookie: {0}")]
    Tampered(String),

    /// Envelope is older than the configured cookie lifetime.
    #[error("Session cookie expired at {0}")]
    Expired(DateTime<Utc>),

    /// A chunk index below the highest one seen is absent.
    #[error("Session cookie chunk {0} missing")]
    MissingChunk(usize),

    /// The same chunk index was sent more than once.
    #[error("Session cookie chunk {0} sent twice")]
    DuplicateChunk(usize),

    /// Cipher setup or encryption failed.
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Session could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CodecError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Tampered(_) | Self::Expired(_) | Self::MissingChunk(_) | Self::DuplicateChunk(_) => {
                ErrorKind::TamperedOrExpired
            }
            Self::Cipher(e) => e.kind(),
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "iat")]
    issued_at: i64,
    #[serde(rename = "s")]
    session: SessionState,
}

/// Encrypts, chunks, and reassembles session cookies.
#[derive(Debug)]
pub struct CookieCodec {
    cipher: SessionCipher,
    config: CookieConfig,
    max_chunk_size: usize,
}

impl CookieCodec {
    /// Create a codec keyed from `config.secret`.
    ///
    /// # Errors
    ///
    /// Returns error if the secret is empty.
    pub fn new(config: CookieConfig) -> Result<Self, CodecError> {
        let cipher = SessionCipher::from_secret(config.secret.expose_secret().as_bytes())?;
        Ok(Self::with_cipher(cipher, config))
    }

    /// Create a codec with an explicit cipher.
    #[must_use]
    pub fn with_cipher(cipher: SessionCipher, config: CookieConfig) -> Self {
        Self {
            cipher,
            config,
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// Override the chunk size.
    #[must_use]
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size.max(1);
        self
    }

    /// Base cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Cookie settings.
    #[must_use]
    pub const fn config(&self) -> &CookieConfig {
        &self.config
    }

    /// Cookie name for chunk `index`.
    #[must_use]
    pub fn chunk_name(&self, index: usize) -> String {
        if index == 0 {
            self.config.name.clone()
        } else {
            format!("{}_{index}", self.config.name)
        }
    }

    /// Encode a session into ordered cookie values.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or encryption fails.
    pub fn encode(&self, session: &SessionState) -> Result<Vec<String>, CodecError> {
        self.encode_at(session, Utc::now())
    }

    fn encode_at(
        &self,
        session: &SessionState,
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<String>, CodecError> {
        let envelope = Envelope {
            issued_at: issued_at.timestamp(),
            session: session.clone(),
        };
        let plaintext =
            serde_json::to_vec(&envelope).map_err(|e| CodecError::Serialization(e.to_string()))?;
        let encoded = self.seal_value(&plaintext)?;

        // base64 output is ASCII, so byte offsets are char boundaries
        Ok(encoded
            .as_bytes()
            .chunks(self.max_chunk_size)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect())
    }

    /// Decode ordered cookie values back into a session.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is tampered, malformed, or expired.
    pub fn decode<S: AsRef<str>>(&self, values: &[S]) -> Result<SessionState, CodecError> {
        self.decode_at(values, Utc::now())
    }

    fn decode_at<S: AsRef<str>>(
        &self,
        values: &[S],
        now: DateTime<Utc>,
    ) -> Result<SessionState, CodecError> {
        let joined: String = values.iter().map(AsRef::as_ref).collect();
        let plaintext = self.open_value(&joined)?;
        let envelope: Envelope = serde_json::from_slice(&plaintext)
            .map_err(|e| CodecError::Tampered(format!("invalid payload: {e}")))?;

        if let Some(expire) = self.config.expire() {
            let issued = DateTime::<Utc>::from_timestamp(envelope.issued_at, 0)
                .ok_or_else(|| CodecError::Tampered("invalid issue time".to_string()))?;
            let deadline = chrono::Duration::from_std(expire)
                .ok()
                .and_then(|lifetime| issued.checked_add_signed(lifetime))
                .ok_or_else(|| CodecError::Tampered("cookie lifetime out of range".to_string()))?;
            if now > deadline {
                return Err(CodecError::Expired(deadline));
            }
        }

        Ok(envelope.session)
    }

    /// Encrypt an opaque value bound to this cookie name and encode it as base64.
    ///
    /// # Errors
    ///
    /// Returns error if encryption fails.
    pub fn seal_value(&self, plaintext: &[u8]) -> Result<String, CodecError> {
        let sealed = self.cipher.seal(plaintext, self.config.name.as_bytes())?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Reverse [`seal_value`](Self::seal_value).
    ///
    /// # Errors
    ///
    /// Returns error if the value is not valid base64 or fails authentication.
    pub fn open_value(&self, value: &str) -> Result<Vec<u8>, CodecError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| CodecError::Tampered(format!("invalid encoding: {e}")))?;
        self.cipher
            .open(&sealed, self.config.name.as_bytes())
            .map_err(|e| CodecError::Tampered(e.to_string()))
    }

    /// Gather this codec's chunks from the request cookies, in index order.
    ///
    /// Returns `Ok(None)` if no chunk is present.
    ///
    /// # Errors
    ///
    /// Returns error on a repeated or missing chunk index.
    pub fn collect_chunks(&self, jar: &CookieJar) -> Result<Option<Vec<String>>, CodecError> {
        let mut chunks = BTreeMap::new();
        for (name, value) in jar.request_cookies() {
            let Some(index) = self.chunk_index(name) else {
                continue;
            };
            if chunks.insert(index, value.clone()).is_some() {
                return Err(CodecError::DuplicateChunk(index));
            }
        }
        if chunks.is_empty() {
            return Ok(None);
        }
        for (expected, index) in chunks.keys().enumerate() {
            if *index != expected {
                return Err(CodecError::MissingChunk(expected));
            }
        }
        Ok(Some(chunks.into_values().collect()))
    }

    fn chunk_index(&self, name: &str) -> Option<usize> {
        let rest = name.strip_prefix(self.config.name.as_str())?;
        if rest.is_empty() {
            return Some(0);
        }
        let index: usize = rest.strip_prefix('_')?.parse().ok()?;
        (index > 0 && index <= MAX_CHUNK_INDEX).then_some(index)
    }

    /// Read and decode the session cookie from the jar.
    ///
    /// # Errors
    ///
    /// Returns error on any chunk, authentication, or expiry failure.
    pub fn load(&self, jar: &CookieJar) -> Result<Option<SessionState>, CodecError> {
        match self.collect_chunks(jar)? {
            Some(values) => self.decode(&values).map(Some),
            None => Ok(None),
        }
    }

    /// Encode the session and write it to the jar, expiring stale chunks.
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails.
    pub fn save(&self, jar: &mut CookieJar, session: &SessionState) -> Result<(), CodecError> {
        let values = self.encode(session)?;
        self.write_values(jar, values);
        Ok(())
    }

    /// Write pre-encoded values as this codec's chunk cookies.
    pub fn write_values(&self, jar: &mut CookieJar, values: Vec<String>) {
        let count = values.len();
        let stale_end = self.highest_observed_index(jar).map_or(0, |i| i + 1);
        for (index, value) in values.into_iter().enumerate() {
            let cookie = self.make_cookie(self.chunk_name(index), value, jar.domain(), false);
            jar.set(cookie);
        }
        for index in count..stale_end {
            let cookie = self.make_cookie(self.chunk_name(index), String::new(), jar.domain(), true);
            jar.set(cookie);
        }
    }

    /// Expire every chunk the client sent, and the base cookie.
    pub fn clear(&self, jar: &mut CookieJar) {
        let end = self.highest_observed_index(jar).map_or(1, |i| i + 1);
        for index in 0..end {
            let cookie = self.make_cookie(self.chunk_name(index), String::new(), jar.domain(), true);
            jar.set(cookie);
        }
    }

    /// Whether the request carries any cookie named like one of this codec's chunks.
    #[must_use]
    pub fn is_present(&self, jar: &CookieJar) -> bool {
        self.highest_observed_index(jar).is_some()
    }

    fn highest_observed_index(&self, jar: &CookieJar) -> Option<usize> {
        jar.request_cookies()
            .iter()
            .filter_map(|(name, _)| self.chunk_index(name))
            .max()
    }

    /// Build a cookie with the configured attributes.
    #[must_use]
    pub fn make_cookie(
        &self,
        name: String,
        value: String,
        domain: &str,
        expire_now: bool,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path(self.config.path.clone())
            .secure(self.config.secure)
            .http_only(self.config.http_only);
        if !domain.is_empty() {
            builder = builder.domain(domain.to_string());
        }
        builder = match self.config.same_site {
            SameSiteMode::Lax => builder.same_site(SameSite::Lax),
            SameSiteMode::Strict => builder.same_site(SameSite::Strict),
            SameSiteMode::None => builder.same_site(SameSite::None),
            SameSiteMode::Unset => builder,
        };
        if expire_now {
            builder = builder.max_age(cookie::time::Duration::ZERO);
        } else if let Some(expire) = self.config.expire() {
            let secs = i64::try_from(expire.as_secs()).unwrap_or(i64::MAX);
            builder = builder.max_age(cookie::time::Duration::seconds(secs));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretString;
    use pretty_assertions::assert_eq;

    fn codec() -> CookieCodec {
        CookieCodec::new(CookieConfig {
            name: "_authgate".to_string(),
            secret: SecretString::from("a very secret secret"),
            ..CookieConfig::default()
        })
        .unwrap()
    }

    fn session() -> SessionState {
        let mut s = SessionState::with_tokens("access", "id");
        s.refresh_token = "refresh".to_string();
        s.email = "user@example.com".to_string();
        s.user = "user".to_string();
        s.set_groups(["admins", "devs"]);
        s.set_expires_in(3600);
        s
    }

    #[test]
    fn test_roundtrip() {
        let codec = codec();
        let s = session();
        let values = codec.encode(&s).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(codec.decode(&values).unwrap(), s);
    }

    #[test]
    fn test_multi_chunk_roundtrip() {
        let codec = codec();
        let mut s = session();
        s.id_token = "x".repeat(10_000);
        let values = codec.encode(&s).unwrap();
        assert!(values.len() >= 3);
        assert!(values.iter().all(|v| v.len() <= MAX_CHUNK_SIZE));
        assert_eq!(codec.decode(&values).unwrap(), s);
    }

    #[test]
    fn test_byte_flip_is_tampered() {
        let codec = codec();
        let encoded = codec.encode(&session()).unwrap().concat();
        let bytes = encoded.as_bytes();
        for i in (0..bytes.len()).step_by(7) {
            let mut flipped = bytes.to_vec();
            flipped[i] = if flipped[i] == b'A' { b'B' } else { b'A' };
            let value = String::from_utf8(flipped).unwrap();
            let err = codec.decode(&[value]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TamperedOrExpired, "byte {i}");
        }
    }

    #[test]
    fn test_reordered_chunks_rejected() {
        let codec = codec().with_max_chunk_size(64);
        let mut values = codec.encode(&session()).unwrap();
        values.swap(0, 1);
        assert!(codec.decode(&values).is_err());
    }

    #[test]
    fn test_other_cookie_name_rejected() {
        let a = codec();
        let b = CookieCodec::new(CookieConfig {
            name: "_other".to_string(),
            secret: SecretString::from("a very secret secret"),
            ..CookieConfig::default()
        })
        .unwrap();
        let values = a.encode(&session()).unwrap();
        assert!(b.decode(&values).is_err());
    }

    #[test]
    fn test_expired_envelope() {
        let codec = CookieCodec::new(CookieConfig {
            secret: SecretString::from("s"),
            expire_secs: 60,
            ..CookieConfig::default()
        })
        .unwrap();
        let issued = Utc::now() - chrono::Duration::seconds(120);
        let values = codec.encode_at(&session(), issued).unwrap();
        let err = codec.decode(&values).unwrap_err();
        assert!(matches!(err, CodecError::Expired(_)));
        assert_eq!(err.kind(), ErrorKind::TamperedOrExpired);

        // no lifetime configured: age is not checked
        let unbounded = CookieCodec::new(CookieConfig {
            secret: SecretString::from("s"),
            expire_secs: 0,
            ..CookieConfig::default()
        })
        .unwrap();
        let values = unbounded.encode_at(&session(), issued).unwrap();
        assert!(unbounded.decode(&values).is_ok());
    }

    #[test]
    fn test_oversized_lifetime_does_not_panic() {
        for expire_secs in [100_000_000_000_000, u64::MAX] {
            let codec = CookieCodec::new(CookieConfig {
                secret: SecretString::from("s"),
                expire_secs,
                ..CookieConfig::default()
            })
            .unwrap();
            let values = codec.encode(&session()).unwrap();
            let err = codec.decode(&values).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TamperedOrExpired);
        }
    }

    #[test]
    fn test_jar_save_load() {
        let codec = codec().with_max_chunk_size(100);
        let mut jar = CookieJar::new().with_domain(".example.com");
        let s = session();
        codec.save(&mut jar, &s).unwrap();

        let names: Vec<_> = jar.response_cookies().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names[0], "_authgate");
        assert_eq!(names[1], "_authgate_1");
        assert!(jar
            .response_cookies()
            .iter()
            .all(|c| c.domain() == Some("example.com") || c.domain() == Some(".example.com")));

        let next = jar.next_request();
        assert_eq!(codec.load(&next).unwrap(), Some(s));
    }

    #[test]
    fn test_missing_chunk() {
        let codec = codec().with_max_chunk_size(100);
        let values = codec.encode(&session()).unwrap();
        let mut jar = CookieJar::new();
        jar.add_request_cookie(codec.chunk_name(0), values[0].clone());
        jar.add_request_cookie(codec.chunk_name(2), values[2].clone());
        assert!(matches!(
            codec.collect_chunks(&jar),
            Err(CodecError::MissingChunk(1))
        ));
    }

    #[test]
    fn test_duplicate_chunk() {
        let codec = codec();
        let values = codec.encode(&session()).unwrap();
        let mut jar = CookieJar::new();
        jar.add_request_cookie("_authgate", values[0].clone());
        jar.add_request_cookie("_authgate", values[0].clone());
        let err = codec.load(&jar).unwrap_err();
        assert!(matches!(err, CodecError::DuplicateChunk(0)));
    }

    #[test]
    fn test_unrelated_cookies_ignored() {
        let codec = codec();
        let jar = CookieJar::from_cookie_header("_authgate_csrf=x; _authgateextra=y; other=z");
        assert_eq!(codec.load(&jar).unwrap(), None);
    }

    #[test]
    fn test_shrinking_session_expires_stale_chunks() {
        let codec = codec().with_max_chunk_size(100);
        let mut big = session();
        big.id_token = "y".repeat(500);
        let mut jar = CookieJar::new();
        codec.save(&mut jar, &big).unwrap();
        let mut jar = jar.next_request();
        let before = codec.collect_chunks(&jar).unwrap().unwrap().len();

        let small = SessionState::with_tokens("a", "");
        codec.save(&mut jar, &small).unwrap();
        let after = jar.next_request();
        let chunks = codec.collect_chunks(&after).unwrap().unwrap();
        assert!(chunks.len() < before);
        assert_eq!(codec.decode(&chunks).unwrap(), small);
    }

    #[test]
    fn test_clear() {
        let codec = codec().with_max_chunk_size(100);
        let mut jar = CookieJar::new();
        codec.save(&mut jar, &session()).unwrap();
        let mut jar = jar.next_request();
        codec.clear(&mut jar);
        assert!(jar
            .response_cookies()
            .iter()
            .all(|c| c.max_age() == Some(cookie::time::Duration::ZERO)));
        assert_eq!(codec.load(&jar.next_request()).unwrap(), None);
    }

    #[test]
    fn test_seal_value() {
        let codec = codec();
        let sealed = codec.seal_value(b"ticket").unwrap();
        assert_eq!(codec.open_value(&sealed).unwrap(), b"ticket");
        assert!(codec.open_value("not base64 !").is_err());
    }
}

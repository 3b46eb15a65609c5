//! Session tickets for server-side stores.
//!
//! A ticket is a random store key plus a per-session key. The session is
//! sealed with the per-session key before it reaches the store, so the store
//! alone cannot read it. The client cookie carries both halves, sealed again
//! under the cookie secret.

use authgate_core::cipher::random_bytes;
use authgate_core::{CodecError, CookieCodec, SessionCipher, SessionState};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use zeroize::Zeroize;

use crate::error::SessionError;

const ID_LEN: usize = 16;
const SECRET_LEN: usize = 32;

/// Handle to a session held in a server-side store.
#[derive(Clone)]
pub struct Ticket {
    name: String,
    id: [u8; ID_LEN],
    secret: [u8; SECRET_LEN],
}

impl Ticket {
    /// Create a fresh random ticket for the cookie `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: random_bytes(),
            secret: random_bytes(),
        }
    }

    /// Key the session is stored under: `<cookie name>-<hex id>`.
    #[must_use]
    pub fn store_key(&self) -> String {
        format!("{}-{}", self.name, hex::encode(self.id))
    }

    /// Encode the ticket as a cookie value sealed by `codec`.
    ///
    /// # Errors
    ///
    /// Returns error if sealing fails.
    pub fn to_cookie_value(&self, codec: &CookieCodec) -> Result<String, SessionError> {
        let mut plain = format!("{}.{}", self.store_key(), URL_SAFE_NO_PAD.encode(self.secret));
        let sealed = codec.seal_value(plain.as_bytes());
        plain.zeroize();
        Ok(sealed?)
    }

    /// Decode a ticket from its sealed cookie value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Tampered`] if the value fails authentication or
    /// does not parse as a ticket for `codec`'s cookie name.
    pub fn from_cookie_value(codec: &CookieCodec, value: &str) -> Result<Self, SessionError> {
        let mut plain = codec.open_value(value)?;
        let parsed = Self::parse(codec.name(), &plain);
        plain.zeroize();
        parsed.ok_or_else(|| CodecError::Tampered("malformed session ticket".to_string()).into())
    }

    fn parse(name: &str, plain: &[u8]) -> Option<Self> {
        let plain = std::str::from_utf8(plain).ok()?;
        let (key, secret) = plain.split_once('.')?;
        let id_hex = key.strip_prefix(name)?.strip_prefix('-')?;

        let id: [u8; ID_LEN] = hex::decode(id_hex).ok()?.try_into().ok()?;
        let mut secret_bytes = URL_SAFE_NO_PAD.decode(secret).ok()?;
        let secret: Option<[u8; SECRET_LEN]> = secret_bytes.as_slice().try_into().ok();
        secret_bytes.zeroize();

        Some(Self {
            name: name.to_string(),
            id,
            secret: secret?,
        })
    }

    fn cipher(&self) -> SessionCipher {
        SessionCipher::new(self.secret)
    }

    /// Serialize and encrypt a session for the store, bound to this ticket's key.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or encryption fails.
    pub fn seal(&self, session: &SessionState) -> Result<Vec<u8>, SessionError> {
        let mut json = serde_json::to_vec(session)?;
        let sealed = self.cipher().seal(&json, self.store_key().as_bytes());
        json.zeroize();
        sealed.map_err(|e| SessionError::Codec(e.into()))
    }

    /// Decrypt and parse a blob produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Tampered`] if the blob fails authentication or parsing.
    pub fn open(&self, blob: &[u8]) -> Result<SessionState, SessionError> {
        let mut json = self
            .cipher()
            .open(blob, self.store_key().as_bytes())
            .map_err(|e| CodecError::Tampered(e.to_string()))?;
        let session = serde_json::from_slice(&json)
            .map_err(|e| CodecError::Tampered(format!("invalid stored session: {e}")));
        json.zeroize();
        Ok(session?)
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("key", &self.store_key())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

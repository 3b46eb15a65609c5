//! Authenticated encryption for session data.
//!
//! - `SessionCipher`: AES-256-GCM keyed from a server-held secret
//! - `random_bytes`: nonce and ticket material

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use blake2::{Blake2b, Digest, digest::consts::U32};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use thiserror::Error;
use zeroize::Zeroize;

use crate::error::ErrorKind;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors from encryption and decryption.
#[derive(Error, Debug)]
pub enum CipherError {
    /// The key material is unusable.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Ciphertext failed authentication or is malformed.
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encrypt(String),
}

impl CipherError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey(_) => ErrorKind::Config,
            Self::Decrypt(_) => ErrorKind::TamperedOrExpired,
            Self::Encrypt(_) => ErrorKind::Internal,
        }
    }
}

/// AES-256-GCM cipher with the nonce prepended to each ciphertext.
pub struct SessionCipher {
    key: SecretBox<[u8; 32]>,
}

impl SessionCipher {
    /// Create a cipher from a raw 32-byte key.
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key: SecretBox::new(Box::new(key)),
        }
    }

    /// Derive the key from an arbitrary-length secret with BLAKE2b-256.
    ///
    /// # Errors
    ///
    /// Returns error if the secret is empty.
    pub fn from_secret(secret: &[u8]) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::InvalidKey("secret is empty".to_string()));
        }
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(b"authgate-session-cipher");
        hasher.update(secret);
        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        let cipher = Self::new(key);
        key.zeroize();
        Ok(cipher)
    }

    /// Create a cipher from a key of exactly 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the slice has the wrong length.
    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CipherError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::new(key))
    }

    /// Encrypt `data`, binding it to `aad`.
    ///
    /// # Errors
    ///
    /// Returns error if the AEAD rejects the input.
    pub fn seal(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = Aes256Gcm::new(self.key.expose_secret().into());

        let nonce_bytes: [u8; NONCE_LEN] = random_bytes();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: data, aad })
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        Ok([nonce_bytes.as_slice(), &ciphertext].concat())
    }

    /// Decrypt data produced by [`seal`](Self::seal) with the same `aad`.
    ///
    /// # Errors
    ///
    /// Returns error on truncated input or authentication-tag mismatch.
    pub fn open(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>, CipherError> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Decrypt("data too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(self.key.expose_secret().into());
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad })
            .map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionCipher([REDACTED])")
    }
}

/// Fill a fixed-size array from the thread RNG.
#[must_use]
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

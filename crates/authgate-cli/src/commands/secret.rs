//! Cookie secret generation.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;

/// Smallest secret length accepted, in bytes.
pub const MIN_SECRET_BYTES: usize = 16;

/// Generate a random secret of `bytes` bytes, URL-safe base64 encoded.
#[must_use]
pub fn generate_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes.max(MIN_SECRET_BYTES)];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Print a new cookie secret.
pub fn run_secret(bytes: usize) {
    println!("{}", generate_secret(bytes));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret(32);
        assert_eq!(URL_SAFE_NO_PAD.decode(&secret).unwrap().len(), 32);
        assert_ne!(secret, generate_secret(32));
    }

    #[test]
    fn test_generate_secret_minimum() {
        let secret = generate_secret(4);
        assert_eq!(URL_SAFE_NO_PAD.decode(&secret).unwrap().len(), MIN_SECRET_BYTES);
    }
}

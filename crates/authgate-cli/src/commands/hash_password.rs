//! Produce a users-file entry for basic auth.

use crate::ui;
use anyhow::{Result, bail};
use authgate_core::hash_password;

/// Build a `user:hash` line for the basic-auth users file.
///
/// # Errors
///
/// Returns error if the username is empty or contains `:`, or hashing fails.
pub fn users_file_entry(username: &str, password: &str) -> Result<String> {
    if username.is_empty() || username.contains(':') {
        bail!("username must be non-empty and must not contain ':'");
    }
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(format!("{username}:{}", hash_password(password)?))
}

/// Hash a password, prompting for it when not given.
///
/// # Errors
///
/// Returns error if the prompt fails or the entry is invalid.
pub fn run_hash_password(username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => {
            ui::warning("Passing a password on the command line leaves it in shell history");
            password
        }
        None => ui::prompts::new_password("Password")?,
    };
    println!("{}", users_file_entry(username, &password)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate_core::BasicAuthenticator;

    #[test]
    fn test_entry_verifies() {
        let entry = users_file_entry("alice", "hunter2").unwrap();
        assert!(entry.starts_with("alice:$argon2"));

        let auth = BasicAuthenticator::parse(&entry).unwrap();
        assert_eq!(auth.len(), 1);
    }

    #[test]
    fn test_entry_rejects_bad_username() {
        assert!(users_file_entry("", "pw").is_err());
        assert!(users_file_entry("a:b", "pw").is_err());
        assert!(users_file_entry("alice", "").is_err());
    }
}

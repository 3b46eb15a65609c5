//! The session record exchanged between the codec, stores, and providers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity and token record for one authenticated caller.
///
/// Field names are shortened on the wire to keep cookies small.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// OAuth2 access token. Non-empty means authenticated.
    #[serde(rename = "at", default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,

    /// OIDC ID token.
    #[serde(rename = "it", default, skip_serializing_if = "String::is_empty")]
    pub id_token: String,

    /// Refresh token, if the provider issued one.
    #[serde(rename = "rt", default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,

    /// Email address of the caller.
    #[serde(rename = "e", default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    /// Username of the caller.
    #[serde(rename = "u", default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    /// Preferred display username.
    #[serde(rename = "pu", default, skip_serializing_if = "String::is_empty")]
    pub preferred_username: String,

    /// Groups from the most recent claim extraction, in order, without duplicates.
    #[serde(rename = "g", default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// When the access token expires.
    #[serde(rename = "eo", default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,

    /// When the session was created or last refreshed.
    #[serde(rename = "ca")]
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    /// Create an empty session stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_token: String::new(),
            id_token: String::new(),
            refresh_token: String::new(),
            email: String::new(),
            user: String::new(),
            preferred_username: String::new(),
            groups: Vec::new(),
            expires_on: None,
            created_at: Utc::now(),
        }
    }

    /// Create a session holding the given tokens.
    #[must_use]
    pub fn with_tokens(access_token: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: id_token.into(),
            ..Self::new()
        }
    }

    /// Whether the session carries an access token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Whether `expires_on` is set and in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether `expires_on` is set and before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|exp| exp <= now)
    }

    /// Time elapsed since creation.
    #[must_use]
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    /// Time left before expiry, if an expiry is set.
    #[must_use]
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_on.map(|exp| exp - Utc::now())
    }

    /// Set `expires_on` from a lifetime in seconds, as returned by token endpoints.
    ///
    /// Returns `false` and leaves `expires_on` untouched when the lifetime
    /// does not fit in a timestamp.
    pub fn set_expires_in(&mut self, seconds: i64) -> bool {
        let expires_on =
            Duration::try_seconds(seconds).and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        if let Some(expires_on) = expires_on {
            self.expires_on = Some(expires_on);
        }
        expires_on.is_some()
    }

    /// Replace the group list, dropping duplicates and keeping first-seen order.
    pub fn set_groups<I, S>(&mut self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for group in groups {
            let group = group.into();
            if !group.is_empty() && !unique.contains(&group) {
                unique.push(group);
            }
        }
        self.groups = unique;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session{{email:{} user:{}", self.email, self.user)?;
        if !self.preferred_username.is_empty() {
            write!(f, " PreferredUsername:{}", self.preferred_username)?;
        }
        if !self.access_token.is_empty() {
            f.write_str(" token:true")?;
        }
        if !self.id_token.is_empty() {
            f.write_str(" id_token:true")?;
        }
        write!(f, " created:{}", self.created_at)?;
        if let Some(exp) = self.expires_on {
            write!(f, " expires:{exp}")?;
        }
        if !self.refresh_token.is_empty() {
            f.write_str(" refresh_token:true")?;
        }
        if !self.groups.is_empty() {
            write!(f, " groups:{:?}", self.groups)?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("email", &self.email)
            .field("user", &self.user)
            .field("preferred_username", &self.preferred_username)
            .field("groups", &self.groups)
            .field("expires_on", &self.expires_on)
            .field("created_at", &self.created_at)
            .field("access_token", &redacted(&self.access_token))
            .field("id_token", &redacted(&self.id_token))
            .field("refresh_token", &redacted(&self.refresh_token))
            .finish()
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "[REDACTED]" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated() {
        assert!(!SessionState::new().is_authenticated());
        assert!(SessionState::with_tokens("at", "").is_authenticated());
    }

    #[test]
    fn test_expiry() {
        let mut session = SessionState::new();
        assert!(!session.is_expired());

        session.set_expires_in(-10);
        assert!(session.is_expired());

        session.set_expires_in(3600);
        assert!(!session.is_expired());
        assert!(session.expires_in().unwrap() > Duration::minutes(59));
    }

    #[test]
    fn test_out_of_range_lifetime_rejected() {
        let mut session = SessionState::new();
        assert!(session.set_expires_in(3600));
        let before = session.expires_on;

        assert!(!session.set_expires_in(i64::MAX));
        assert!(!session.set_expires_in(100_000_000_000_000));
        assert!(!session.set_expires_in(i64::MIN));
        assert_eq!(session.expires_on, before);
    }

    #[test]
    fn test_set_groups_dedups_in_order() {
        let mut session = SessionState::new();
        session.set_groups(["b", "a", "b", "", "c"]);
        assert_eq!(session.groups, vec!["b", "a", "c"]);

        // replaced, never merged
        session.set_groups(["z"]);
        assert_eq!(session.groups, vec!["z"]);
    }

    #[test]
    fn test_redaction() {
        let mut session = SessionState::with_tokens("secret-access", "secret-id");
        session.email = "user@example.com".to_string();

        let debug = format!("{session:?}");
        let display = format!("{session}");
        assert!(!debug.contains("secret-access"));
        assert!(!display.contains("secret-id"));
        assert!(display.contains("user@example.com"));
        assert!(display.contains("token:true"));
    }

    #[test]
    fn test_compact_serialization() {
        let session = SessionState::with_tokens("at", "");
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"at\":\"at\""));
        assert!(!json.contains("\"it\""));

        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}

//! Process-local cache of group memberships keyed by email.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Group memberships learned during email lookup.
///
/// Entries live for the process lifetime. Readers always see a whole entry.
#[derive(Debug, Default)]
pub struct GroupCache {
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl GroupCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups recorded for `email`, or `None` if the user is unknown.
    #[must_use]
    pub fn get(&self, email: &str) -> Option<Vec<String>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(email)
            .cloned()
    }

    /// Record (or replace) the groups for `email`.
    pub fn insert(&self, email: impl Into<String>, groups: Vec<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(email.into(), groups);
    }

    /// Forget `email`.
    pub fn remove(&self, email: &str) -> Option<Vec<String>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(email)
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no user is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

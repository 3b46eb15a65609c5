//! Path-prefix group authorization.

use std::collections::HashMap;
use std::path::Path;

use crate::traits::ProviderError;

/// Group that admits any authenticated caller.
pub const ANY_GROUP: &str = "*";

/// Mapping from `host/path` prefix to the groups allowed under it.
///
/// Loaded from YAML:
///
/// ```yaml
/// test.com:
///   - "*"
/// test.com/admin:
///   - admins
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationTable {
    rules: HashMap<String, Vec<String>>,
}

impl AuthorizationTable {
    /// Parse a YAML table.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not a map of string lists.
    pub fn from_yaml(content: &str) -> Result<Self, ProviderError> {
        let rules: Option<HashMap<String, Vec<String>>> = serde_yaml::from_str(content)
            .map_err(|e| ProviderError::Config(format!("auth file unmarshal error: {e}")))?;
        Ok(Self {
            rules: rules.unwrap_or_default(),
        })
    }

    /// Load a YAML table from disk.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Config(format!("auth file load error {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Groups allowed for `uri`, from the longest matching prefix.
    ///
    /// No matching prefix yields an empty slice, which denies everyone.
    #[must_use]
    pub fn allowed_groups(&self, uri: &str) -> &[String] {
        self.rules
            .iter()
            .filter(|(prefix, _)| uri.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, groups)| groups.as_slice())
            .unwrap_or(&[])
    }

    /// Number of prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for AuthorizationTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

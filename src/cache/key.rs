//! Cache Key Module
//!
//! Logical keys, versions, and the storage keys they map to.

use crate::error::{CacheError, Result};
use crate::store::escape_glob;

/// Separates prefix, version and name in a storage key.
const KEY_SEPARATOR: char = ':';

// == Cache Key ==
/// A logical key with an optional version.
///
/// Without a version the client's default version is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Caller-supplied key name
    pub name: String,
    /// Explicit version, if any
    pub version: Option<i64>,
}

impl CacheKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Pins the key to a version.
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }
}

impl From<&str> for CacheKey {
    fn from(name: &str) -> Self {
        CacheKey::new(name)
    }
}

impl From<String> for CacheKey {
    fn from(name: String) -> Self {
        CacheKey::new(name)
    }
}

impl From<&String> for CacheKey {
    fn from(name: &String) -> Self {
        CacheKey::new(name.as_str())
    }
}

impl From<(&str, i64)> for CacheKey {
    fn from((name, version): (&str, i64)) -> Self {
        CacheKey::new(name).with_version(version)
    }
}

// == Key Space ==
/// Namespace prefix plus default version: turns logical keys into storage
/// keys (`prefix:version:name`) and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    default_version: i64,
}

impl KeySpace {
    /// Fails with `InvalidConfig` if the prefix contains the separator,
    /// since `a` would then own every key of `a:1`.
    pub fn new(prefix: impl Into<String>, default_version: i64) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.contains(KEY_SEPARATOR) {
            return Err(CacheError::InvalidConfig(format!(
                "key prefix '{}' must not contain '{}'",
                prefix, KEY_SEPARATOR
            )));
        }
        Ok(Self {
            prefix,
            default_version,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_version(&self) -> i64 {
        self.default_version
    }

    /// Version a key resolves to.
    pub fn version_of(&self, key: &CacheKey) -> i64 {
        key.version.unwrap_or(self.default_version)
    }

    /// Storage key for a logical key.
    pub fn storage_key(&self, key: &CacheKey) -> String {
        self.storage_key_at(&key.name, self.version_of(key))
    }

    pub fn storage_key_at(&self, name: &str, version: i64) -> String {
        format!("{}:{}:{}", self.prefix, version, name)
    }

    /// Glob scoped to this namespace and the default version.
    ///
    /// The prefix is escaped so its own glob characters match literally;
    /// `pattern` keeps its glob meaning.
    pub fn scoped_pattern(&self, pattern: &str) -> String {
        format!(
            "{}:{}:{}",
            escape_glob(&self.prefix),
            self.default_version,
            pattern
        )
    }

    /// Glob matching every version under this namespace.
    pub fn namespace_pattern(&self) -> String {
        format!("{}:*", escape_glob(&self.prefix))
    }

    /// Logical name of a storage key at the default version.
    pub fn logical_name<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(':')?
            .strip_prefix(self.default_version.to_string().as_str())?
            .strip_prefix(':')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_format() {
        let space = KeySpace::new("", 1).unwrap();
        assert_eq!(space.storage_key(&"keytest".into()), ":1:keytest");
        assert_eq!(space.storage_key(&("keytest", 2).into()), ":2:keytest");

        let space = KeySpace::new("app", 3).unwrap();
        assert_eq!(space.storage_key(&"k".into()), "app:3:k");
    }

    #[test]
    fn test_same_key_same_storage_key() {
        let space = KeySpace::new("app", 1).unwrap();
        let a = space.storage_key(&CacheKey::new("user"));
        let b = space.storage_key(&CacheKey::new("user").with_version(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_logical_name_round_trip() {
        let space = KeySpace::new("app", 1).unwrap();
        let storage = space.storage_key(&"foo:bar".into());
        assert_eq!(space.logical_name(&storage), Some("foo:bar"));
    }

    #[test]
    fn test_logical_name_rejects_other_versions() {
        let space = KeySpace::new("app", 1).unwrap();
        assert_eq!(space.logical_name("app:2:foo"), None);
        assert_eq!(space.logical_name("app:12:foo"), None);
        assert_eq!(space.logical_name("other:1:foo"), None);
    }

    #[test]
    fn test_scoped_pattern_escapes_prefix() {
        let space = KeySpace::new("a*b", 1).unwrap();
        assert_eq!(space.scoped_pattern("foo*"), "a\\*b:1:foo*");
        assert_eq!(space.namespace_pattern(), "a\\*b:*");
    }

    #[test]
    fn test_prefix_with_separator_is_rejected() {
        assert!(matches!(
            KeySpace::new("a:1", 1),
            Err(CacheError::InvalidConfig(_))
        ));
        assert!(KeySpace::new("a.b-c", 1).is_ok());
    }
}

//! Memory Store Module
//!
//! In-process store with TTL expiration that follows Redis command semantics.
//! Serves as the backing store for tests and for embedding without a server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use num_bigint::BigInt;
use tracing::debug;

use crate::codec::parse_integer;
use crate::error::{CacheError, Result};
use crate::store::{compile_glob, current_timestamp_ms, CacheEntry, Store, StoreEntry, Ttl};

// == Memory Store ==
/// HashMap-backed store with lazy expiry.
#[derive(Debug)]
pub struct MemoryStore {
    /// Key-value storage
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// When false every command fails as a connection failure
    available: AtomicBool,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    // == Availability ==
    /// Simulates an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    // == Length ==
    /// Returns the number of unexpired entries.
    pub fn len(&self) -> usize {
        self.lock()
            .map(|mut entries| {
                purge_expired(&mut entries);
                entries.len()
            })
            .unwrap_or(0)
    }

    // == Is Empty ==
    /// Returns true if the store holds no unexpired entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        Ok(purge_expired(&mut entries))
    }

    /// Locks the map after checking the simulated connection.
    fn connect(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::Connection(
                "memory store is unavailable".to_string(),
            ));
        }
        self.lock()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Internal("memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops expired entries, returning the count.
fn purge_expired(entries: &mut HashMap<String, CacheEntry>) -> usize {
    let now = current_timestamp_ms();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired_at(now));
    let removed = before - entries.len();
    if removed > 0 {
        debug!("Memory store: purged {} expired entries", removed);
    }
    removed
}

/// Returns the live entry for `key`, removing it first if it has expired.
fn live<'a>(
    entries: &'a mut HashMap<String, CacheEntry>,
    key: &str,
) -> Option<&'a mut CacheEntry> {
    if entries.get(key).is_some_and(CacheEntry::is_expired) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.connect()?;
        Ok(live(&mut entries, key).map(|entry| entry.value.clone()))
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut entries = self.connect()?;
        Ok(keys
            .iter()
            .map(|key| live(&mut entries, key).map(|entry| entry.value.clone()))
            .collect())
    }

    fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>, nx: bool) -> Result<bool> {
        let mut entries = self.connect()?;
        if nx && live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), CacheEntry::new(value.to_vec(), expiry));
        Ok(true)
    }

    fn set_many(&self, items: &[StoreEntry]) -> Result<()> {
        let mut entries = self.connect()?;
        for (key, value, expiry) in items {
            entries.insert(key.clone(), CacheEntry::new(value.clone(), *expiry));
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.connect()?;
        Ok(live(&mut entries, key).is_some())
    }

    fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.connect()?;
        let mut removed = 0;
        for key in keys {
            if live(&mut entries, key).is_some() {
                entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn incr_by(&self, key: &str, delta: &BigInt) -> Result<Option<BigInt>> {
        let mut entries = self.connect()?;
        let Some(entry) = live(&mut entries, key) else {
            return Ok(None);
        };
        let current = parse_integer(&entry.value).ok_or_else(|| {
            CacheError::NotSupported(format!("value at '{}' is not an integer", key))
        })?;
        let next = current + delta;
        entry.value = next.to_string().into_bytes();
        Ok(Some(next))
    }

    fn replace(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool> {
        let mut entries = self.connect()?;
        match live(&mut entries, key) {
            Some(entry) if entry.value == expected => {
                entry.value = value.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

        fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let mut entries = self.connect()?;
        if live(&mut entries, from).is_none() {
            return Ok(false);
        }
        if let Some(entry) = entries.remove(from) {
            entries.insert(to.to_string(), entry);
        }
        Ok(true)
    }

    fn expire(&self, key: &str, expiry: Option<Duration>) -> Result<bool> {
        let mut entries = self.connect()?;
        match live(&mut entries, key) {
            Some(entry) => {
                entry.set_ttl(expiry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn ttl(&self, key: &str) -> Result<Option<Ttl>> {
        let mut entries = self.connect()?;
        Ok(live(&mut entries, key).map(|entry| match entry.ttl_remaining() {
            Some(remaining) => Ttl::Remaining(remaining),
            None => Ttl::Forever,
        }))
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = compile_glob(pattern)?;
        let mut entries = self.connect()?;
        purge_expired(&mut entries);
        Ok(entries
            .keys()
            .filter(|key| matcher.is_match(key.as_str()))
            .cloned()
            .collect())
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let matcher = compile_glob(pattern)?;
        let mut entries = self.connect()?;
        purge_expired(&mut entries);
        let before = entries.len();
        entries.retain(|key, _| !matcher.is_match(key.as_str()));
        Ok((before - entries.len()) as u64)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_store_new() {
        let store = MemoryStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let store = MemoryStore::new();

        assert!(store.set("key1", b"value1", None, false).unwrap());
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_store_set_nx() {
        let store = MemoryStore::new();

        assert!(store.set("key1", b"a", None, true).unwrap());
        assert!(!store.set("key1", b"b", None, true).unwrap());
        assert_eq!(store.get("key1").unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn test_store_set_nx_after_expiry() {
        let store = MemoryStore::new();

        store
            .set("key1", b"a", Some(Duration::from_millis(100)), false)
            .unwrap();
        sleep(Duration::from_millis(150));

        assert!(store.set("key1", b"b", None, true).unwrap());
    }

    #[test]
    fn test_store_delete() {
        let store = MemoryStore::new();

        store.set("key1", b"value1", None, false).unwrap();
        assert_eq!(store.delete(&keys(&["key1", "missing"])).unwrap(), 1);
        assert!(store.is_empty());
        assert_eq!(store.delete(&keys(&["key1"])).unwrap(), 0);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let store = MemoryStore::new();

        store
            .set("key1", b"value1", Some(Duration::from_millis(200)), false)
            .unwrap();
        assert!(store.exists("key1").unwrap());

        sleep(Duration::from_millis(250));

        assert_eq!(store.get("key1").unwrap(), None);
        assert!(!store.exists("key1").unwrap());
    }

    #[test]
    fn test_store_huge_expiry_is_persistent() {
        let store = MemoryStore::new();

        assert!(store.set("key1", b"a", Some(Duration::MAX), false).unwrap());
        assert_eq!(store.ttl("key1").unwrap(), Some(Ttl::Forever));
        assert!(store.expire("key1", Some(Duration::MAX)).unwrap());

        // The store stays usable afterwards
        assert!(store.set("key2", b"b", Some(Duration::from_secs(5)), false).unwrap());
        assert_eq!(store.get("key2").unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn test_store_replace_compares_value() {
        let store = MemoryStore::new();
        store.set("key1", b"old", Some(Duration::from_secs(60)), false).unwrap();

        assert!(!store.replace("key1", b"other", b"new").unwrap());
        assert!(store.replace("key1", b"old", b"new").unwrap());
        assert_eq!(store.get("key1").unwrap(), Some(b"new".to_vec()));
        assert!(matches!(store.ttl("key1").unwrap(), Some(Ttl::Remaining(_))));

        assert!(!store.replace("missing", b"old", b"new").unwrap());
        assert!(!store.exists("missing").unwrap());
    }

    #[test]
    fn test_store_set_many_per_entry_expiry() {
        let store = MemoryStore::new();
        store
            .set_many(&[
                ("short".to_string(), b"1".to_vec(), Some(Duration::from_millis(100))),
                ("long".to_string(), b"2".to_vec(), None),
            ])
            .unwrap();

        sleep(Duration::from_millis(150));
        assert_eq!(store.get("short").unwrap(), None);
        assert_eq!(store.get("long").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_store_cleanup_expired() {
        let store = MemoryStore::new();

        store
            .set("key1", b"value1", Some(Duration::from_millis(100)), false)
            .unwrap();
        store
            .set("key2", b"value2", Some(Duration::from_secs(10)), false)
            .unwrap();

        sleep(Duration::from_millis(150));

        assert_eq!(store.cleanup_expired().unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_incr_by() {
        let store = MemoryStore::new();

        store.set("n", b"9223372036854775807", None, false).unwrap();
        let next = store.incr_by("n", &BigInt::from(1)).unwrap().unwrap();
        assert_eq!(next.to_string(), "9223372036854775808");
        assert_eq!(store.get("n").unwrap(), Some(b"9223372036854775808".to_vec()));
    }

    #[test]
    fn test_store_incr_by_missing_and_non_integer() {
        let store = MemoryStore::new();

        assert_eq!(store.incr_by("missing", &BigInt::from(1)).unwrap(), None);

        store.set("text", b"abc", None, false).unwrap();
        assert!(matches!(
            store.incr_by("text", &BigInt::from(1)),
            Err(CacheError::NotSupported(_))
        ));
    }

    #[test]
    fn test_store_incr_keeps_ttl() {
        let store = MemoryStore::new();

        store
            .set("n", b"1", Some(Duration::from_secs(30)), false)
            .unwrap();
        store.incr_by("n", &BigInt::from(1)).unwrap();

        assert!(matches!(store.ttl("n").unwrap(), Some(Ttl::Remaining(_))));
    }

    #[test]
    fn test_store_rename_moves_ttl() {
        let store = MemoryStore::new();

        store
            .set("old", b"v", Some(Duration::from_secs(30)), false)
            .unwrap();
        assert!(store.rename("old", "new").unwrap());
        assert_eq!(store.get("old").unwrap(), None);
        assert_eq!(store.get("new").unwrap(), Some(b"v".to_vec()));
        assert!(matches!(store.ttl("new").unwrap(), Some(Ttl::Remaining(_))));

        assert!(!store.rename("old", "other").unwrap());
    }

    #[test]
    fn test_store_rename_onto_itself() {
        let store = MemoryStore::new();

        store.set("same", b"v", None, false).unwrap();
        assert!(store.rename("same", "same").unwrap());
        assert_eq!(store.get("same").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_store_expire_and_ttl() {
        let store = MemoryStore::new();

        store.set("k", b"v", None, false).unwrap();
        assert_eq!(store.ttl("k").unwrap(), Some(Ttl::Forever));

        assert!(store.expire("k", Some(Duration::from_secs(60))).unwrap());
        assert!(matches!(store.ttl("k").unwrap(), Some(Ttl::Remaining(_))));

        assert!(store.expire("k", None).unwrap());
        assert_eq!(store.ttl("k").unwrap(), Some(Ttl::Forever));

        assert!(!store.expire("missing", None).unwrap());
        assert_eq!(store.ttl("missing").unwrap(), None);
    }

    #[test]
    fn test_store_keys_and_delete_pattern() {
        let store = MemoryStore::new();
        for key in [":1:foo-aa", ":1:foo-ab", ":1:foo-bb", ":2:foo-aa"] {
            store.set(key, b"foo", None, false).unwrap();
        }

        let mut found = store.keys(":1:foo-a*").unwrap();
        found.sort();
        assert_eq!(found, keys(&[":1:foo-aa", ":1:foo-ab"]));

        assert_eq!(store.delete_pattern(":1:*foo-a*").unwrap(), 2);
        assert_eq!(store.delete_pattern(":1:*foo-a*").unwrap(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_store_unavailable() {
        let store = MemoryStore::new();
        store.set("k", b"v", None, false).unwrap();

        store.set_available(false);
        assert!(matches!(store.get("k"), Err(CacheError::Connection(_))));
        assert!(matches!(
            store.set("k", b"v", None, false),
            Err(CacheError::Connection(_))
        ));

        store.set_available(true);
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }
}

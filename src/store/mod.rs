//! Store Module
//!
//! The backing-store protocol the cache client is written against, with a
//! Redis implementation and an in-process implementation.
//!
//! Keys passed to a [`Store`] are full storage keys; values are already
//! encoded. Stores never interpret payloads except for the decimal integers
//! that `incr_by` operates on.

mod entry;
mod memory;
mod pattern;
mod redis;

use std::time::Duration;

use num_bigint::BigInt;

use crate::error::Result;

pub use self::redis::RedisStore;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use memory::MemoryStore;
pub use pattern::{compile_glob, escape_glob};

// == Expiry Limit ==
/// Longest expiry a store honours (about 136 years). Longer lifetimes are
/// stored without expiry.
pub const MAX_EXPIRY: Duration = Duration::from_secs(u32::MAX as u64);

/// Milliseconds to hand to a store for `ttl`, or None when it exceeds
/// [`MAX_EXPIRY`] and the key should simply not expire.
pub(crate) fn expiry_millis(ttl: Duration) -> Option<u64> {
    if ttl > MAX_EXPIRY {
        return None;
    }
    u64::try_from(ttl.as_millis()).ok()
}

// == Ttl ==
/// Remaining lifetime of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key has no expiration
    Forever,
    /// Key expires after the given duration
    Remaining(Duration),
}

/// Storage key, encoded value and expiry of one write in a batch.
pub type StoreEntry = (String, Vec<u8>, Option<Duration>);

// == Store Trait ==
/// Commands a backing store must provide.
///
/// Every method is a single atomic operation from the point of view of other
/// clients of the same store.
pub trait Store: Send + Sync {
    /// Reads a key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Reads several keys; the result is positional.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Writes a key, optionally only if absent. Returns whether it wrote.
    fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>, nx: bool) -> Result<bool>;

    /// Writes several keys, each with its own expiry.
    fn set_many(&self, entries: &[StoreEntry]) -> Result<()> {
        for (key, value, expiry) in entries {
            self.set(key, value, *expiry, false)?;
        }
        Ok(())
    }

    /// True if the key is present.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Removes keys, returning how many existed.
    fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Adds `delta` to a decimal integer value, keeping its expiry.
    ///
    /// Returns `Ok(None)` for an absent key and `NotSupported` when the
    /// stored bytes are not a decimal integer.
    fn incr_by(&self, key: &str, delta: &BigInt) -> Result<Option<BigInt>>;

    /// Swaps the value of `key` only if it still equals `expected`, keeping
    /// the expiry. Returns whether the swap happened.
    fn replace(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool>;

    /// Moves a key and its expiry. Returns false if `from` is absent.
    fn rename(&self, from: &str, to: &str) -> Result<bool>;

    /// Replaces the expiry of an existing key (`None` removes it).
    fn expire(&self, key: &str, expiry: Option<Duration>) -> Result<bool>;

    /// Remaining lifetime, `None` for an absent key.
    fn ttl(&self, key: &str) -> Result<Option<Ttl>>;

    /// Storage keys matching a Redis glob pattern.
    ///
    /// Malformed globs differ by store: Redis reads an unclosed `[` as a
    /// class running to the end of the pattern, `MemoryStore` fails with
    /// `InvalidPattern`. Escape a literal `[` as `\[` to match it on both.
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Removes every key matching a glob pattern, returning the count.
    /// Pattern rules are those of [`Store::keys`].
    fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// Releases any held connection.
    fn close(&self) {}
}

//! Cache Entry Module
//!
//! Defines the structure for entries held by the in-memory store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::store::expiry_millis;

// == Cache Entry ==
/// Represents a single stored payload with its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The encoded value
    pub value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring after `ttl`, or never.
    pub fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: deadline(current_timestamp_ms(), ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub(crate) fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Expiry Update ==
    /// Restarts the expiry clock from now, or removes it.
    pub fn set_ttl(&mut self, ttl: Option<Duration>) {
        self.expires_at = deadline(current_timestamp_ms(), ttl);
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has a TTL that hasn't elapsed
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at.map(|expires| {
            let now = current_timestamp_ms();
            Duration::from_millis(expires.saturating_sub(now))
        })
    }
}

// == Utility Functions ==
/// Absolute expiry for `ttl` from `now_ms`; None past the expiry limit.
fn deadline(now_ms: u64, ttl: Option<Duration>) -> Option<u64> {
    ttl.and_then(expiry_millis)
        .and_then(|ms| now_ms.checked_add(ms))
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Client Options Module
//!
//! Timeouts, write options, and the suppression toggle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// == Public Constants ==
/// Expiry used for a zero timeout: the smallest whole-second lifetime.
pub const MIN_EXPIRY: Duration = Duration::from_secs(1);

/// Default entry lifetime in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Refresh window for herd payloads read by a client without herd mode
pub const DEFAULT_HERD_TIMEOUT: Duration = Duration::from_secs(60);

// == Timeout ==
/// Per-entry lifetime requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// The client's configured default
    #[default]
    Default,
    /// No expiration
    Never,
    /// Seconds; `0` is the minimum lifetime, negative means already expired
    Seconds(i64),
}

/// A timeout resolved against the client default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    Never,
    After(Duration),
    Immediate,
}

impl Expiry {
    pub(crate) fn resolve(timeout: Timeout, default: Option<Duration>) -> Self {
        match timeout {
            Timeout::Default => match default {
                None => Expiry::Never,
                Some(d) if d.is_zero() => Expiry::After(MIN_EXPIRY),
                Some(d) => Expiry::After(d),
            },
            Timeout::Never => Expiry::Never,
            Timeout::Seconds(s) if s < 0 => Expiry::Immediate,
            Timeout::Seconds(0) => Expiry::After(MIN_EXPIRY),
            Timeout::Seconds(s) => Expiry::After(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Lifetime to hand to the store; `None` for no expiry.
    pub(crate) fn ttl(self) -> Option<Duration> {
        match self {
            Expiry::After(d) => Some(d),
            Expiry::Never | Expiry::Immediate => None,
        }
    }
}

// == Set Options ==
/// Options for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub timeout: Timeout,
    /// Only write if the key is absent
    pub nx: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn seconds(self, seconds: i64) -> Self {
        self.timeout(Timeout::Seconds(seconds))
    }

    pub fn nx(mut self) -> Self {
        self.nx = true;
        self
    }
}

// == Suppression ==
/// Shared switch that turns connection failures into no-op results.
///
/// Cloning yields a handle to the same switch; every client operation reads
/// it at call time.
#[derive(Debug, Clone, Default)]
pub struct Suppression(Arc<AtomicBool>);

impl Suppression {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

// == Cache Options ==
/// Construction-time client settings.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Namespace prepended to every storage key
    pub key_prefix: String,
    /// Version used when a key carries none
    pub default_version: i64,
    /// Lifetime for `Timeout::Default`; None = never expire
    pub default_timeout: Option<Duration>,
    /// Connection-failure suppression switch
    pub suppression: Suppression,
    /// Log each suppressed failure at warn level
    pub log_ignored_exceptions: bool,
    /// Herd mode refresh window; None disables herd mode
    pub herd_timeout: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            default_version: 1,
            default_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            suppression: Suppression::default(),
            log_ignored_exceptions: false,
            herd_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Option<Duration> = Some(Duration::from_secs(300));

    #[test]
    fn test_resolve_timeouts() {
        assert_eq!(
            Expiry::resolve(Timeout::Default, DEFAULT),
            Expiry::After(Duration::from_secs(300))
        );
        assert_eq!(Expiry::resolve(Timeout::Default, None), Expiry::Never);
        assert_eq!(Expiry::resolve(Timeout::Never, DEFAULT), Expiry::Never);
        assert_eq!(
            Expiry::resolve(Timeout::Seconds(3), DEFAULT),
            Expiry::After(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_zero_is_minimum_expiry() {
        assert_eq!(
            Expiry::resolve(Timeout::Seconds(0), DEFAULT),
            Expiry::After(MIN_EXPIRY)
        );
        assert_eq!(
            Expiry::resolve(Timeout::Default, Some(Duration::ZERO)),
            Expiry::After(MIN_EXPIRY)
        );
    }

    #[test]
    fn test_negative_is_immediate() {
        assert_eq!(Expiry::resolve(Timeout::Seconds(-1), DEFAULT), Expiry::Immediate);
        assert_eq!(Expiry::Immediate.ttl(), None);
    }

    #[test]
    fn test_set_options_builder() {
        let opts = SetOptions::new().seconds(2).nx();
        assert_eq!(opts.timeout, Timeout::Seconds(2));
        assert!(opts.nx);
    }

    #[test]
    fn test_suppression_handles_share_state() {
        let a = Suppression::new(false);
        let b = a.clone();
        b.set(true);
        assert!(a.is_enabled());
    }
}

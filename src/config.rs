//! Configuration Module
//!
//! Handles loading and managing client configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::{CacheOptions, ReadPolicy, Suppression, DEFAULT_TIMEOUT_SECS};

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis URLs; the first is the primary, the rest are read replicas
    pub redis_urls: Vec<String>,
    /// Namespace prepended to every storage key
    pub key_prefix: String,
    /// Version used when a key carries none
    pub default_version: i64,
    /// Default entry lifetime in seconds, None = never expire
    pub default_timeout: Option<u64>,
    /// Swallow connection failures
    pub ignore_exceptions: bool,
    /// Log swallowed connection failures
    pub log_ignored_exceptions: bool,
    /// Socket timeout in milliseconds, 0 = none
    pub socket_timeout_ms: u64,
    /// Replica selection for reads
    pub read_policy: ReadPolicy,
    /// Herd refresh window in seconds, None = herd mode off
    pub herd_timeout: Option<u64>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_REDIS_URLS` - Comma-separated URLs (default: redis://127.0.0.1:6379/0)
    /// - `CACHE_KEY_PREFIX` - Key namespace (default: empty)
    /// - `CACHE_DEFAULT_VERSION` - Default key version (default: 1)
    /// - `CACHE_DEFAULT_TIMEOUT` - Seconds, or `none` (default: 300)
    /// - `CACHE_IGNORE_EXCEPTIONS` - Suppress connection failures (default: false)
    /// - `CACHE_LOG_IGNORED_EXCEPTIONS` - Log suppressed failures (default: false)
    /// - `CACHE_SOCKET_TIMEOUT_MS` - Socket timeout (default: 5000)
    /// - `CACHE_READ_POLICY` - first-replica, round-robin or primary (default: first-replica)
    /// - `CACHE_HERD_TIMEOUT` - Herd refresh window in seconds, `0` or `none` disables (default: off)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            redis_urls: env::var("CACHE_REDIS_URLS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|url| !url.is_empty())
                        .map(String::from)
                        .collect::<Vec<_>>()
                })
                .filter(|urls| !urls.is_empty())
                .unwrap_or(defaults.redis_urls),
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            default_version: env::var("CACHE_DEFAULT_VERSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_version),
            default_timeout: match env::var("CACHE_DEFAULT_TIMEOUT") {
                Ok(v) if v.trim().eq_ignore_ascii_case("none") => None,
                Ok(v) => v.parse().ok().or(defaults.default_timeout),
                Err(_) => defaults.default_timeout,
            },
            ignore_exceptions: env::var("CACHE_IGNORE_EXCEPTIONS")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.ignore_exceptions),
            log_ignored_exceptions: env::var("CACHE_LOG_IGNORED_EXCEPTIONS")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.log_ignored_exceptions),
            socket_timeout_ms: env::var("CACHE_SOCKET_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.socket_timeout_ms),
            read_policy: env::var("CACHE_READ_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.read_policy),
            herd_timeout: match env::var("CACHE_HERD_TIMEOUT") {
                Ok(v) if v.trim().eq_ignore_ascii_case("none") => None,
                Ok(v) => match v.trim().parse::<u64>() {
                    Ok(0) => None,
                    Ok(secs) => Some(secs),
                    Err(_) => defaults.herd_timeout,
                },
                Err(_) => defaults.herd_timeout,
            },
        }
    }

    /// Socket timeout, None when disabled.
    pub fn socket_timeout(&self) -> Option<Duration> {
        (self.socket_timeout_ms > 0).then(|| Duration::from_millis(self.socket_timeout_ms))
    }

    /// Options for a client built from this config.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            key_prefix: self.key_prefix.clone(),
            default_version: self.default_version,
            default_timeout: self.default_timeout.map(Duration::from_secs),
            suppression: Suppression::new(self.ignore_exceptions),
            log_ignored_exceptions: self.log_ignored_exceptions,
            herd_timeout: self.herd_timeout.map(Duration::from_secs),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_urls: vec!["redis://127.0.0.1:6379/0".to_string()],
            key_prefix: String::new(),
            default_version: 1,
            default_timeout: Some(DEFAULT_TIMEOUT_SECS),
            ignore_exceptions: false,
            log_ignored_exceptions: false,
            socket_timeout_ms: 5000,
            read_policy: ReadPolicy::FirstReplica,
            herd_timeout: None,
        }
    }
}

//! Error types for the cache client
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache client.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found where an existing key is required (incr, incr_version)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Operation has no safe implementation for the stored value
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Transport to the backing store failed
    #[error("Connection failure: {0}")]
    Connection(String),

    /// Backing store replied with an error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Glob pattern could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Configuration could not be turned into a client
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Client was closed
    #[error("Cache client is closed")]
    Closed,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// True for failures that suppression mode may swallow.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, CacheError::Connection(_))
    }
}

// == Redis Error Conversion ==
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache client.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_connection_failures() {
        assert!(CacheError::Connection("refused".to_string()).is_connection_failure());
        assert!(!CacheError::NotSupported("incr".to_string()).is_connection_failure());
        assert!(!CacheError::Backend("WRONGTYPE".to_string()).is_connection_failure());
        assert!(!CacheError::Closed.is_connection_failure());
    }

    #[test]
    fn test_redis_io_error_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: CacheError = redis::RedisError::from(io).into();
        assert!(matches!(err, CacheError::Connection(_)));
    }

    #[test]
    fn test_redis_response_error_maps_to_backend() {
        let redis_err = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "value is not an integer",
        ));
        let err: CacheError = redis_err.into();
        assert!(matches!(err, CacheError::Backend(_)));
    }
}

//! Cache Module
//!
//! The cache client facade and the types its operations take.

mod client;
mod clients;
mod key;
mod options;


// Re-export public types
pub use client::CacheClient;
pub use clients::{ClientSet, ReadPolicy};
pub use key::{CacheKey, KeySpace};
pub(crate) use options::Expiry;
pub use options::{
    CacheOptions, SetOptions, Suppression, Timeout, DEFAULT_HERD_TIMEOUT, DEFAULT_TIMEOUT_SECS,
    MIN_EXPIRY,
};

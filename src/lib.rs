//! Redis Cache - A keyed cache client backed by Redis
//!
//! Provides versioned keys, typed values, NX writes, atomic counters past
//! 64 bits, pattern deletion and primary/replica routing.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod store;

pub use cache::{CacheClient, CacheKey, CacheOptions, ClientSet, SetOptions, Timeout};
pub use codec::Value;
pub use config::Config;
pub use error::{CacheError, Result};
pub use store::{MemoryStore, RedisStore, Store};

//! Integration Tests against a live Redis server
//!
//! Ignored by default. Run with a server listening on `REDIS_URL`
//! (default `redis://127.0.0.1:6379/15`):
//!
//! ```text
//! cargo test --test redis_store_tests -- --ignored --test-threads=1
//! ```

use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use num_bigint::BigInt;

use redis_cache::store::Ttl;
use redis_cache::{
    CacheClient, CacheError, CacheOptions, ClientSet, RedisStore, SetOptions, Store, Timeout,
    Value,
};

// == Helper Functions ==

fn redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string())
}

/// Client with its own prefix, emptied before use.
fn create_cache(prefix: &str) -> CacheClient<RedisStore> {
    let store = RedisStore::open(&redis_url(), Some(Duration::from_secs(2))).unwrap();
    let cache = CacheClient::with_store(
        store,
        CacheOptions {
            key_prefix: format!("redis_cache_test_{}", prefix),
            ..CacheOptions::default()
        },
    )
    .unwrap();
    cache.clear().unwrap();
    cache
}

// == Store Commands ==

#[test]
#[ignore]
fn test_store_set_nx_and_ttl() {
    let store = RedisStore::open(&redis_url(), None).unwrap();
    let keys = vec!["redis_cache_test_raw:k".to_string()];
    store.delete(&keys).unwrap();

    assert!(store
        .set(&keys[0], b"v", Some(Duration::from_secs(60)), true)
        .unwrap());
    assert!(!store.set(&keys[0], b"w", None, true).unwrap());
    assert_eq!(store.get(&keys[0]).unwrap(), Some(b"v".to_vec()));
    assert!(matches!(store.ttl(&keys[0]).unwrap(), Some(Ttl::Remaining(_))));

    assert!(store.expire(&keys[0], None).unwrap());
    assert_eq!(store.ttl(&keys[0]).unwrap(), Some(Ttl::Forever));

    assert_eq!(store.delete(&keys).unwrap(), 1);
    assert_eq!(store.ttl(&keys[0]).unwrap(), None);
    assert!(!store.expire(&keys[0], None).unwrap());
}

#[test]
#[ignore]
fn test_store_incr_by_fast_and_slow_paths() {
    let store = RedisStore::open(&redis_url(), None).unwrap();
    let key = "redis_cache_test_raw:n";
    store.delete(&[key.to_string()]).unwrap();

    assert_eq!(store.incr_by(key, &BigInt::from(1)).unwrap(), None);

    store.set(key, b"41", None, false).unwrap();
    assert_eq!(
        store.incr_by(key, &BigInt::from(1)).unwrap(),
        Some(BigInt::from(42))
    );

    // Past i64::MAX Redis refuses INCRBY; the transaction takes over
    store
        .set(key, i64::MAX.to_string().as_bytes(), None, false)
        .unwrap();
    let past: BigInt = BigInt::from(i64::MAX) + 1;
    assert_eq!(store.incr_by(key, &BigInt::from(1)).unwrap(), Some(past.clone()));
    assert_eq!(store.get(key).unwrap(), Some(past.to_string().into_bytes()));
    assert_eq!(
        store.incr_by(key, &BigInt::from(-1)).unwrap(),
        Some(BigInt::from(i64::MAX))
    );

    store.set(key, b"abc", None, false).unwrap();
    assert!(matches!(
        store.incr_by(key, &BigInt::from(1)),
        Err(CacheError::NotSupported(_))
    ));
    store.delete(&[key.to_string()]).unwrap();
}

// == Client Behavior ==

#[test]
#[ignore]
fn test_client_round_trips() {
    let cache = create_cache("values");
    let values = vec![
        Value::Int(1),
        Value::from("unicode ☃"),
        Value::Float(0.1),
        Value::Bool(false),
        Value::from(vec![Value::Int(1), Value::from("two")]),
    ];
    for (i, value) in values.into_iter().enumerate() {
        let key = format!("k{}", i);
        cache.set(key.as_str(), value.clone()).unwrap();
        assert_eq!(cache.get(key.as_str()).unwrap(), Some(value));
    }
    cache.clear().unwrap();
}

#[test]
#[ignore]
fn test_client_timeouts() {
    let cache = create_cache("timeouts");

    cache.set_with("zero", 1, SetOptions::new().seconds(0)).unwrap();
    assert_eq!(cache.get("zero").unwrap(), Some(Value::Int(1)));

    cache.set("gone", 1).unwrap();
    assert!(cache
        .set_with("gone", 2, SetOptions::new().seconds(-1))
        .unwrap());
    assert_eq!(cache.get("gone").unwrap(), None);

    cache
        .set_with("never", 1, SetOptions::new().timeout(Timeout::Never))
        .unwrap();
    assert_eq!(cache.ttl("never").unwrap(), Some(Ttl::Forever));

    sleep(Duration::from_millis(1200));
    assert_eq!(cache.get("zero").unwrap(), None);
    cache.clear().unwrap();
}

#[test]
#[ignore]
fn test_client_counters_and_versions() {
    let cache = create_cache("counters");
    cache.set("num", i64::MAX).unwrap();
    let past: BigInt = BigInt::from(i64::MAX) + 1;
    assert_eq!(cache.incr("num", 1).unwrap(), Some(past.clone()));
    assert_eq!(cache.get("num").unwrap(), Some(Value::BigInt(past)));

    cache.set_with(("v", 2), 42, SetOptions::new().seconds(60)).unwrap();
    assert_eq!(cache.incr_version(("v", 2), 1).unwrap(), Some(3));
    assert_eq!(cache.get(("v", 3)).unwrap(), Some(Value::Int(42)));
    assert!(matches!(cache.ttl(("v", 3)).unwrap(), Some(Ttl::Remaining(_))));
    cache.clear().unwrap();
}

#[test]
#[ignore]
fn test_client_patterns() {
    let cache = create_cache("patterns");
    cache
        .set_many([("aa", 1), ("ab", 2), ("bb", 3)], Timeout::Default)
        .unwrap();
    cache.set(("ac", 2), 4).unwrap();

    let expected: HashSet<String> = ["aa", "ab"].iter().map(|s| s.to_string()).collect();
    assert_eq!(cache.keys("a*").unwrap(), expected);

    assert!(cache.delete_pattern("a*").unwrap());
    assert_eq!(cache.get_many(["aa", "ab", "bb"]).unwrap().len(), 1);
    assert_eq!(cache.get(("ac", 2)).unwrap(), Some(Value::Int(4)));
    cache.clear().unwrap();
}

#[test]
#[ignore]
fn test_client_with_replica_connection() {
    let primary = Arc::new(RedisStore::open(&redis_url(), None).unwrap());
    let replica = Arc::new(RedisStore::open(&redis_url(), None).unwrap());
    let cache = CacheClient::new(
        ClientSet::from_arcs(primary, vec![replica]),
        CacheOptions {
            key_prefix: "redis_cache_test_replica".to_string(),
            ..CacheOptions::default()
        },
    )
    .unwrap();

    cache.set("k", "v").unwrap();
    assert_eq!(cache.get("k").unwrap(), Some(Value::from("v")));
    cache.clear().unwrap();
    cache.close();
}

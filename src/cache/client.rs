//! Cache Client Module
//!
//! The facade: logical cache operations over a [`Store`], with versioned
//! keys, typed values, timeout conventions, and failure suppression.
//!
//! # Herd mode
//! With `herd_timeout` set, expiring non-integer values are stored with a
//! stale instant at the requested timeout and a real expiry `herd_timeout`
//! later. The first reader after the stale instant swaps in a new stale
//! instant and gets a miss, so it alone recomputes; other readers keep
//! getting the old value until the refresh lands or the window runs out.

use std::collections::{HashMap, HashSet};
use std::slice;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use num_bigint::BigInt;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheKey, CacheOptions, ClientSet, Expiry, KeySpace, SetOptions, Suppression, Timeout,
    DEFAULT_HERD_TIMEOUT,
};
use crate::codec::{decode, encode, pack_herd, unpack_herd, Value};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::store::{current_timestamp_ms, RedisStore, Store, StoreEntry, Ttl};

// == Cache Client ==
/// Keyed cache over a primary store and optional read replicas.
///
/// Missing keys are never errors: reads return `None`. Connection failures
/// propagate unless the [`Suppression`] switch is on, in which case each
/// operation returns its no-op result instead.
#[derive(Debug)]
pub struct CacheClient<S: Store> {
    /// Connections; None once closed
    clients: RwLock<Option<ClientSet<S>>>,
    /// Namespace and default version
    keys: KeySpace,
    /// Lifetime used for `Timeout::Default`
    default_timeout: Option<Duration>,
    suppression: Suppression,
    log_ignored_exceptions: bool,
    /// Herd refresh window, None when herd mode is off
    herd_timeout: Option<Duration>,
}

impl CacheClient<RedisStore> {
    // == From Config ==
    /// Connects to the configured Redis servers (first one is the primary).
    pub fn from_config(config: &Config) -> Result<Self> {
        let socket_timeout = config.socket_timeout();
        let stores = config
            .redis_urls
            .iter()
            .map(|url| RedisStore::open(url, socket_timeout))
            .collect::<Result<Vec<_>>>()?;
        let clients = ClientSet::from_vec(stores)?.with_policy(config.read_policy);
        let servers = clients.len();
        let client = Self::new(clients, config.cache_options())?;
        info!(
            "Cache client configured: servers={}, prefix='{}', version={}, herd={:?}",
            servers,
            client.keys.prefix(),
            client.keys.default_version(),
            client.herd_timeout
        );
        Ok(client)
    }
}

impl<S: Store> CacheClient<S> {
    // == Constructor ==
    /// Creates a client owning `clients`.
    ///
    /// Fails with `InvalidConfig` when the key prefix contains `:`.
    pub fn new(clients: ClientSet<S>, options: CacheOptions) -> Result<Self> {
        Ok(Self {
            clients: RwLock::new(Some(clients)),
            keys: KeySpace::new(options.key_prefix, options.default_version)?,
            default_timeout: options.default_timeout,
            suppression: options.suppression,
            log_ignored_exceptions: options.log_ignored_exceptions,
            herd_timeout: options.herd_timeout,
        })
    }

    /// Creates a client over a single store.
    pub fn with_store(store: S, options: CacheOptions) -> Result<Self> {
        Self::new(ClientSet::single(store), options)
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    /// Handle to the suppression switch; toggling it affects this client
    /// immediately.
    pub fn suppression(&self) -> &Suppression {
        &self.suppression
    }

    /// Runs `f` against the selected store, applying suppression.
    fn call<T>(
        &self,
        operation: &'static str,
        write: bool,
        fallback: impl FnOnce() -> T,
        f: impl FnOnce(&S) -> Result<T>,
    ) -> Result<T> {
        let guard = self
            .clients
            .read()
            .map_err(|_| CacheError::Internal("client set lock poisoned".to_string()))?;
        let clients = guard.as_ref().ok_or(CacheError::Closed)?;
        let store = clients.get(write);

        match f(store.as_ref()) {
            Err(err) if err.is_connection_failure() && self.suppression.is_enabled() => {
                if self.log_ignored_exceptions {
                    warn!(operation, error = %err, "Ignoring cache connection failure");
                }
                Ok(fallback())
            }
            result => result,
        }
    }

    // == Payloads ==
    /// Encodes a value for writing, returning the payload and store expiry.
    ///
    /// In herd mode an expiring non-integer is wrapped with its stale
    /// instant and kept `herd_timeout` longer. Integers stay bare so the
    /// store can still increment them.
    fn payload(&self, value: &Value, expiry: Expiry) -> Result<(Vec<u8>, Option<Duration>)> {
        let payload = encode(value)?;
        match (self.herd_timeout, expiry) {
            (Some(window), Expiry::After(ttl)) if !value.is_integer() => {
                let stale_at = current_timestamp_ms().saturating_add(saturating_millis(ttl));
                Ok((pack_herd(&payload, stale_at), Some(ttl.saturating_add(window))))
            }
            _ => Ok((payload, expiry.ttl())),
        }
    }

    /// Decodes a stored payload, handing a stale herd payload's refresh to
    /// exactly one caller.
    fn read_payload(&self, storage_key: &str, raw: Vec<u8>) -> Result<Option<Value>> {
        let Some((stale_at, inner)) = unpack_herd(&raw) else {
            return decode(&raw).map(Some);
        };
        let now = current_timestamp_ms();
        if now < stale_at {
            return decode(inner).map(Some);
        }

        let window = self.herd_timeout.unwrap_or(DEFAULT_HERD_TIMEOUT);
        let renewed = pack_herd(inner, now.saturating_add(saturating_millis(window)));
        let claimed = self.call("herd_refresh", true, || false, |store| {
            store.replace(storage_key, &raw, &renewed)
        })?;
        if claimed {
            debug!("HERD {} stale, refresh claimed", storage_key);
            return Ok(None);
        }
        decode(inner).map(Some)
    }

    // == Get ==
    /// Returns the decoded value, or None if absent or expired.
    pub fn get(&self, key: impl Into<CacheKey>) -> Result<Option<Value>> {
        let storage_key = self.keys.storage_key(&key.into());
        debug!("GET {}", storage_key);

        let raw = self.call("get", false, || None, |store| store.get(&storage_key))?;
        match raw {
            Some(raw) => self.read_payload(&storage_key, raw),
            None => Ok(None),
        }
    }

    /// Returns the decoded value, or `default` if absent.
    pub fn get_or(&self, key: impl Into<CacheKey>, default: impl Into<Value>) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    // == Set ==
    /// Writes with the default timeout. Returns true.
    pub fn set(&self, key: impl Into<CacheKey>, value: impl Into<Value>) -> Result<bool> {
        self.set_with(key, value, SetOptions::default())
    }

    /// Writes with explicit options.
    ///
    /// Returns false only when `nx` is set and the key already exists; that
    /// key's value and expiry are left alone. A negative timeout leaves no
    /// entry behind.
    pub fn set_with(
        &self,
        key: impl Into<CacheKey>,
        value: impl Into<Value>,
        options: SetOptions,
    ) -> Result<bool> {
        let storage_key = self.keys.storage_key(&key.into());
        let expiry = Expiry::resolve(options.timeout, self.default_timeout);
        let (payload, ttl) = self.payload(&value.into(), expiry)?;
        debug!("SET {} expiry={:?} nx={}", storage_key, expiry, options.nx);

        self.call("set", true, || false, |store| match expiry {
            Expiry::Immediate if options.nx => Ok(!store.exists(&storage_key)?),
            Expiry::Immediate => {
                store.delete(slice::from_ref(&storage_key))?;
                Ok(true)
            }
            _ => store.set(&storage_key, &payload, ttl, options.nx),
        })
    }

    // == Add ==
    /// Writes only if the key is absent.
    pub fn add(&self, key: impl Into<CacheKey>, value: impl Into<Value>) -> Result<bool> {
        self.set_with(key, value, SetOptions::new().nx())
    }

    // == Delete ==
    /// Removes a key. Returns true if it existed.
    pub fn delete(&self, key: impl Into<CacheKey>) -> Result<bool> {
        let storage_key = self.keys.storage_key(&key.into());
        debug!("DEL {}", storage_key);

        self.call("delete", true, || false, |store| {
            Ok(store.delete(slice::from_ref(&storage_key))? > 0)
        })
    }

    /// Removes several keys. Returns true if at least one existed.
    pub fn delete_many<K: Into<CacheKey>>(&self, keys: impl IntoIterator<Item = K>) -> Result<bool> {
        let storage_keys: Vec<String> = keys
            .into_iter()
            .map(|key| self.keys.storage_key(&key.into()))
            .collect();
        if storage_keys.is_empty() {
            return Ok(false);
        }
        debug!("DEL {} keys", storage_keys.len());

        self.call("delete_many", true, || false, |store| {
            Ok(store.delete(&storage_keys)? > 0)
        })
    }

    // == Get Many ==
    /// Returns the present keys only, keyed by logical name.
    pub fn get_many<K: Into<CacheKey>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<HashMap<String, Value>> {
        let keys: Vec<CacheKey> = keys.into_iter().map(Into::into).collect();
        let storage_keys: Vec<String> = keys.iter().map(|key| self.keys.storage_key(key)).collect();
        debug!("MGET {} keys", storage_keys.len());

        let raws = self.call("get_many", false, Vec::new, |store| {
            store.get_many(&storage_keys)
        })?;
        let mut found = HashMap::with_capacity(raws.len());
        for ((key, storage_key), raw) in keys.iter().zip(&storage_keys).zip(raws) {
            if let Some(raw) = raw {
                if let Some(value) = self.read_payload(storage_key, raw)? {
                    found.insert(key.name.clone(), value);
                }
            }
        }
        Ok(found)
    }

    // == Set Many ==
    /// Writes every entry with a shared timeout.
    pub fn set_many<K, V>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
        timeout: Timeout,
    ) -> Result<()>
    where
        K: Into<CacheKey>,
        V: Into<Value>,
    {
        let expiry = Expiry::resolve(timeout, self.default_timeout);
        let encoded = entries
            .into_iter()
            .map(|(key, value)| {
                let storage_key = self.keys.storage_key(&key.into());
                self.payload(&value.into(), expiry)
                    .map(|(payload, ttl)| (storage_key, payload, ttl))
            })
            .collect::<Result<Vec<StoreEntry>>>()?;
        if encoded.is_empty() {
            return Ok(());
        }
        debug!("SET {} keys expiry={:?}", encoded.len(), expiry);

        self.call("set_many", true, || (), |store| match expiry {
            Expiry::Immediate => {
                let storage_keys: Vec<String> =
                    encoded.iter().map(|(key, _, _)| key.clone()).collect();
                store.delete(&storage_keys).map(|_| ())
            }
            _ => store.set_many(&encoded),
        })
    }

    // == Increment ==
    /// Atomically adds `delta` and returns the new value.
    ///
    /// Errors with `NotFound` for an absent key and `NotSupported` when the
    /// stored value is not an integer. Crossing the 64-bit range is fine.
    /// Returns `Ok(None)` only for a suppressed connection failure.
    pub fn incr(&self, key: impl Into<CacheKey>, delta: impl Into<BigInt>) -> Result<Option<BigInt>> {
        let key = key.into();
        let storage_key = self.keys.storage_key(&key);
        let delta = delta.into();
        debug!("INCRBY {} {}", storage_key, delta);

        self.call("incr", true, || None, |store| {
            match store.incr_by(&storage_key, &delta)? {
                Some(value) => Ok(Some(value)),
                None => Err(CacheError::NotFound(key.name.clone())),
            }
        })
    }

    /// Atomically subtracts `delta`; see [`CacheClient::incr`].
    pub fn decr(&self, key: impl Into<CacheKey>, delta: impl Into<BigInt>) -> Result<Option<BigInt>> {
        let delta: BigInt = delta.into();
        self.incr(key, -delta)
    }

    // == Versions ==
    /// Moves a key from its version to `version + delta`, keeping its TTL,
    /// and returns the new version.
    pub fn incr_version(&self, key: impl Into<CacheKey>, delta: i64) -> Result<Option<i64>> {
        let key = key.into();
        let old_version = self.keys.version_of(&key);
        let new_version = old_version.checked_add(delta).ok_or_else(|| {
            CacheError::NotSupported(format!("version {} + {} overflows", old_version, delta))
        })?;
        let from = self.keys.storage_key_at(&key.name, old_version);
        let to = self.keys.storage_key_at(&key.name, new_version);
        debug!("RENAME {} {}", from, to);

        self.call("incr_version", true, || None, |store| {
            if store.rename(&from, &to)? {
                Ok(Some(new_version))
            } else {
                Err(CacheError::NotFound(key.name.clone()))
            }
        })
    }

    /// Moves a key to `version - delta`; see [`CacheClient::incr_version`].
    pub fn decr_version(&self, key: impl Into<CacheKey>, delta: i64) -> Result<Option<i64>> {
        let delta = delta.checked_neg().ok_or_else(|| {
            CacheError::NotSupported(format!("version delta {} overflows", delta))
        })?;
        self.incr_version(key, delta)
    }

    // == Patterns ==
    /// Deletes every key at the default version whose name matches `pattern`.
    /// Returns true if any key was removed.
    pub fn delete_pattern(&self, pattern: &str) -> Result<bool> {
        let scoped = self.keys.scoped_pattern(pattern);
        debug!("DELETE PATTERN {}", scoped);

        self.call("delete_pattern", true, || false, |store| {
            Ok(store.delete_pattern(&scoped)? > 0)
        })
    }

    /// Logical names at the default version matching `pattern`.
    pub fn keys(&self, pattern: &str) -> Result<HashSet<String>> {
        let scoped = self.keys.scoped_pattern(pattern);
        debug!("SCAN MATCH {}", scoped);

        self.call("keys", false, HashSet::new, |store| {
            Ok(store
                .keys(&scoped)?
                .iter()
                .filter_map(|storage_key| self.keys.logical_name(storage_key))
                .map(str::to_string)
                .collect())
        })
    }

    // == Inspection ==
    /// True if the key is present.
    pub fn has_key(&self, key: impl Into<CacheKey>) -> Result<bool> {
        let storage_key = self.keys.storage_key(&key.into());
        self.call("has_key", false, || false, |store| store.exists(&storage_key))
    }

    /// Remaining lifetime, or None if the key is absent.
    pub fn ttl(&self, key: impl Into<CacheKey>) -> Result<Option<Ttl>> {
        let storage_key = self.keys.storage_key(&key.into());
        self.call("ttl", false, || None, |store| store.ttl(&storage_key))
    }

    /// Gives an existing key a new timeout. Returns false if it is absent.
    pub fn touch(&self, key: impl Into<CacheKey>, timeout: Timeout) -> Result<bool> {
        let storage_key = self.keys.storage_key(&key.into());
        let expiry = Expiry::resolve(timeout, self.default_timeout);
        debug!("TOUCH {} expiry={:?}", storage_key, expiry);

        self.call("touch", true, || false, |store| match expiry {
            Expiry::Immediate => Ok(store.delete(slice::from_ref(&storage_key))? > 0),
            expiry => store.expire(&storage_key, expiry.ttl()),
        })
    }

    // == Clear ==
    /// Removes every key under this client's prefix, all versions.
    pub fn clear(&self) -> Result<()> {
        let pattern = self.keys.namespace_pattern();
        self.call("clear", true, || (), |store| {
            let removed = store.delete_pattern(&pattern)?;
            info!("Cache cleared: removed {} keys matching {}", removed, pattern);
            Ok(())
        })
    }

    // == Client Selection ==
    /// The primary for writes, a replica chosen by the read policy otherwise.
    pub fn get_client(&self, write: bool) -> Result<Arc<S>> {
        let guard = self
            .clients
            .read()
            .map_err(|_| CacheError::Internal("client set lock poisoned".to_string()))?;
        let clients = guard.as_ref().ok_or(CacheError::Closed)?;
        Ok(Arc::clone(clients.get(write)))
    }

    // == Close ==
    /// Releases every connection. Later operations fail with `Closed`.
    pub fn close(&self) {
        let mut guard = match self.clients.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(clients) = guard.take() {
            for store in clients.iter() {
                store.close();
            }
            debug!("Cache client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.clients.read().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

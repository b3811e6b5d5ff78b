//! Redis Store Module
//!
//! [`Store`] over a synchronous Redis connection.
//!
//! Conditional writes use `SET .. NX`; increments, value swaps, renames,
//! expiry updates and pattern deletion run as Lua scripts so each is one
//! atomic server-side step. Increments that overflow Redis' 64-bit counters
//! fall back to a WATCH/MULTI/EXEC transaction doing the arithmetic
//! client-side.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use num_bigint::BigInt;
use redis::{Client, Connection, RedisResult, Script};
use tracing::{debug, warn};

use crate::codec::parse_integer;
use crate::error::{CacheError, Result};
use crate::store::{expiry_millis, Store, StoreEntry, Ttl};

// == Lua Scripts ==

/// KEYS[1] = counter, ARGV[1] = delta (fits i64).
/// Returns {1, new value as bulk string}, {0, ''} when absent,
/// {-1, ''} when Redis refuses the increment (not an integer or overflow).
/// The new value is re-read with GET because Lua numbers are doubles.
const INCR_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {0, ''}
end
local res = redis.pcall('INCRBY', KEYS[1], ARGV[1])
if type(res) == 'table' and res.err then
    return {-1, ''}
end
return {1, redis.call('GET', KEYS[1])}
"#;

/// KEYS[1] = source, KEYS[2] = destination. Returns 1 if moved, 0 if absent.
const RENAME_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('RENAME', KEYS[1], KEYS[2])
return 1
"#;

/// KEYS[1] = key, ARGV[1] = expected value, ARGV[2] = new value.
/// Returns 1 if swapped (expiry kept), 0 otherwise.
const REPLACE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
    return 1
end
return 0
"#;

/// KEYS[1] = key, ARGV[1] = ttl in ms or '' to persist. Returns 1 if present.
const EXPIRE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
if ARGV[1] == '' then
    redis.call('PERSIST', KEYS[1])
else
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return 1
"#;

/// ARGV[1] = glob. Deletes matches in batches; returns the match count.
const DELETE_PATTERN_SCRIPT: &str = r#"
local keys = redis.call('KEYS', ARGV[1])
for i = 1, #keys, 5000 do
    redis.call('DEL', unpack(keys, i, math.min(i + 4999, #keys)))
end
return #keys
"#;

/// Outcome of the transactional increment.
enum SlowIncr {
    Missing,
    NotInteger,
    Done(BigInt),
}

// == Redis Store ==
/// One Redis server reached through a lazily opened connection.
pub struct RedisStore {
    /// Connection factory
    client: Client,
    /// Open connection, dropped after connection-level failures
    conn: Mutex<Option<Connection>>,
    /// Connect, read and write timeout
    socket_timeout: Option<Duration>,
    incr_script: Script,
    replace_script: Script,
    rename_script: Script,
    expire_script: Script,
    delete_pattern_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .field("socket_timeout", &self.socket_timeout)
            .finish()
    }
}

impl RedisStore {
    // == Constructor ==
    /// Creates a store for `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// No connection is made until the first command.
    pub fn open(url: &str, socket_timeout: Option<Duration>) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| CacheError::InvalidConfig(format!("{}: {}", url, e)))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            socket_timeout,
            incr_script: Script::new(INCR_SCRIPT),
            replace_script: Script::new(REPLACE_SCRIPT),
            rename_script: Script::new(RENAME_SCRIPT),
            expire_script: Script::new(EXPIRE_SCRIPT),
            delete_pattern_script: Script::new(DELETE_PATTERN_SCRIPT),
        })
    }

    fn connect(&self) -> RedisResult<Connection> {
        let conn = match self.socket_timeout {
            Some(timeout) => {
                let conn = self.client.get_connection_with_timeout(timeout)?;
                conn.set_read_timeout(Some(timeout))?;
                conn.set_write_timeout(Some(timeout))?;
                conn
            }
            None => self.client.get_connection()?,
        };
        debug!("Redis store: connected to {:?}", self.client.get_connection_info().addr);
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Internal("redis connection lock poisoned".to_string()))
    }

    /// Runs `f` on the shared connection, opening it if needed.
    ///
    /// Connection-level failures discard the connection so the next call
    /// reconnects.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> RedisResult<T>) -> Result<T> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(CacheError::Internal("redis connection missing".to_string()));
        };

        match f(conn) {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = CacheError::from(err);
                if err.is_connection_failure() {
                    warn!("Redis store: dropping connection after failure: {}", err);
                    *guard = None;
                }
                Err(err)
            }
        }
    }

    /// Arbitrary-precision increment under WATCH, preserving TTL.
    fn incr_transaction(&self, key: &str, delta: &BigInt) -> Result<Option<BigInt>> {
        let outcome = self.with_conn(|conn| {
            redis::transaction(conn, &[key], |conn, pipe| {
                let raw: Option<Vec<u8>> = redis::cmd("GET").arg(key).query(conn)?;
                let Some(raw) = raw else {
                    return Ok(Some(SlowIncr::Missing));
                };
                let Some(current) = parse_integer(&raw) else {
                    return Ok(Some(SlowIncr::NotInteger));
                };
                let next = current + delta;
                let committed: Option<()> = pipe
                    .cmd("SET")
                    .arg(key)
                    .arg(next.to_string())
                    .arg("KEEPTTL")
                    .ignore()
                    .query(conn)?;
                Ok(committed.map(|()| SlowIncr::Done(next)))
            })
        })?;

        match outcome {
            SlowIncr::Missing => Ok(None),
            SlowIncr::NotInteger => Err(CacheError::NotSupported(format!(
                "value at '{}' is not an integer",
                key
            ))),
            SlowIncr::Done(next) => Ok(Some(next)),
        }
    }
}

impl Store for RedisStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| redis::cmd("MGET").arg(keys).query(conn))
    }

    fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>, nx: bool) -> Result<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ms) = expiry.and_then(expiry_millis) {
            cmd.arg("PX").arg(ms);
        }
        if nx {
            cmd.arg("NX");
        }
        let reply: Option<redis::Value> = self.with_conn(|conn| cmd.query(conn))?;
        Ok(reply.is_some())
    }

    fn set_many(&self, entries: &[StoreEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value, expiry) in entries {
            pipe.cmd("SET").arg(key).arg(value.as_slice());
            if let Some(ms) = expiry.and_then(expiry_millis) {
                pipe.arg("PX").arg(ms);
            }
            pipe.ignore();
        }
        self.with_conn(|conn| pipe.query(conn))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| redis::cmd("EXISTS").arg(key).query(conn))
    }

    fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| redis::cmd("DEL").arg(keys).query(conn))
    }

    fn incr_by(&self, key: &str, delta: &BigInt) -> Result<Option<BigInt>> {
        if let Ok(small) = i64::try_from(delta) {
            let (status, raw): (i64, Vec<u8>) = self.with_conn(|conn| {
                self.incr_script.key(key).arg(small).invoke(conn)
            })?;
            match status {
                0 => return Ok(None),
                1 => {
                    return parse_integer(&raw).map(Some).ok_or_else(|| {
                        CacheError::Backend(format!("INCRBY on '{}' returned a non-integer", key))
                    })
                }
                _ => debug!("Redis store: INCRBY refused for '{}', using transaction", key),
            }
        }
        self.incr_transaction(key, delta)
    }

    fn replace(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            self.replace_script
                .key(key)
                .arg(expected)
                .arg(value)
                .invoke(conn)
        })
    }

        fn rename(&self, from: &str, to: &str) -> Result<bool> {
        self.with_conn(|conn| self.rename_script.key(from).key(to).invoke(conn))
    }

    fn expire(&self, key: &str, expiry: Option<Duration>) -> Result<bool> {
        let ttl_ms = expiry
            .and_then(expiry_millis)
            .map(|ms| ms.to_string())
            .unwrap_or_default();
        self.with_conn(|conn| self.expire_script.key(key).arg(ttl_ms).invoke(conn))
    }

    fn ttl(&self, key: &str) -> Result<Option<Ttl>> {
        let ms: i64 = self.with_conn(|conn| redis::cmd("PTTL").arg(key).query(conn))?;
        Ok(match ms {
            -2 => None,
            -1 => Some(Ttl::Forever),
            ms => Some(Ttl::Remaining(Duration::from_millis(ms.max(0) as u64))),
        })
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut cursor: u64 = 0;
            let mut found = Vec::new();
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(1000)
                    .query(conn)?;
                found.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            found.sort();
            found.dedup();
            Ok(found)
        })
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        self.with_conn(|conn| self.delete_pattern_script.arg(pattern).invoke(conn))
    }

    fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            if guard.take().is_some() {
                debug!("Redis store: connection closed");
            }
        }
    }
}

//! Redis Cache - command line access to a cache namespace
//!
//! Runs one cache operation against the Redis servers named by the
//! environment (see `Config::from_env`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redis_cache::cache::{CacheKey, SetOptions, Timeout};
use redis_cache::store::Ttl;
use redis_cache::{CacheClient, Config, Value};

#[derive(Debug, Parser)]
#[command(name = "redis_cache", version, about = "Run cache operations against Redis")]
struct Cli {
    /// Key version (defaults to CACHE_DEFAULT_VERSION)
    #[arg(long, global = true)]
    key_version: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a value
    Get { key: String },
    /// Store a value
    Set {
        key: String,
        value: String,
        /// Lifetime in seconds; 0 = minimum, negative = delete
        #[arg(long, allow_hyphen_values = true)]
        timeout: Option<i64>,
        /// Never expire
        #[arg(long, conflicts_with = "timeout")]
        persist: bool,
        /// Only write if absent
        #[arg(long)]
        nx: bool,
        /// Parse VALUE as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a value only if absent
    Add {
        key: String,
        value: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete keys
    Delete { keys: Vec<String> },
    /// Increment a counter
    Incr {
        key: String,
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },
    /// Decrement a counter
    Decr {
        key: String,
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },
    /// Move a key to a later version
    IncrVersion {
        key: String,
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },
    /// List key names matching a glob
    Keys { pattern: String },
    /// Delete keys matching a glob
    DeletePattern { pattern: String },
    /// Show remaining lifetime
    Ttl { key: String },
    /// Delete every key under the prefix
    Clear,
}

fn parse_value(raw: &str, json: bool) -> Result<Value> {
    if json {
        let parsed: serde_json::Value =
            serde_json::from_str(raw).with_context(|| format!("invalid JSON: {}", raw))?;
        return Ok(Value::try_from(parsed)?);
    }
    Ok(match raw.parse::<i64>() {
        Ok(n) => Value::Int(n),
        Err(_) => Value::from(raw),
    })
}

fn main() -> Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redis_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    info!(
        "Configuration loaded: servers={}, prefix='{}', default_timeout={:?}, herd_timeout={:?}",
        config.redis_urls.len(),
        config.key_prefix,
        config.default_timeout,
        config.herd_timeout
    );

    let cache = CacheClient::from_config(&config)?;
    let key = |name: &str| {
        let key = CacheKey::new(name);
        match cli.key_version {
            Some(version) => key.with_version(version),
            None => key,
        }
    };

    match &cli.command {
        Command::Get { key: name } => match cache.get(key(name))? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Command::Set {
            key: name,
            value,
            timeout,
            persist,
            nx,
            json,
        } => {
            let timeout = match (timeout, persist) {
                (_, true) => Timeout::Never,
                (Some(seconds), false) => Timeout::Seconds(*seconds),
                (None, false) => Timeout::Default,
            };
            let mut options = SetOptions::new().timeout(timeout);
            options.nx = *nx;
            println!("{}", cache.set_with(key(name), parse_value(value, *json)?, options)?);
        }
        Command::Add {
            key: name,
            value,
            json,
        } => println!("{}", cache.add(key(name), parse_value(value, *json)?)?),
        Command::Delete { keys } => {
            println!("{}", cache.delete_many(keys.iter().map(|name| key(name)))?)
        }
        Command::Incr { key: name, by } => print_counter(cache.incr(key(name), *by)?),
        Command::Decr { key: name, by } => print_counter(cache.decr(key(name), *by)?),
        Command::IncrVersion { key: name, by } => match cache.incr_version(key(name), *by)? {
            Some(version) => println!("{}", version),
            None => println!("(nil)"),
        },
        Command::Keys { pattern } => {
            let mut names: Vec<String> = cache.keys(pattern)?.into_iter().collect();
            names.sort();
            for name in names {
                println!("{}", name);
            }
        }
        Command::DeletePattern { pattern } => println!("{}", cache.delete_pattern(pattern)?),
        Command::Ttl { key: name } => match cache.ttl(key(name))? {
            Some(Ttl::Forever) => println!("-1"),
            Some(Ttl::Remaining(left)) => println!("{:.3}", left.as_secs_f64()),
            None => println!("-2"),
        },
        Command::Clear => cache.clear()?,
    }

    cache.close();
    Ok(())
}

fn print_counter(value: Option<num_bigint::BigInt>) {
    match value {
        Some(n) => println!("{}", n),
        None => println!("(nil)"),
    }
}

use crate::db::engine::EngineOptions;
use crate::error::{MemuDbError, Result};
use config::{Config as ConfigBuilder, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Prefix shared by every environment key this crate reads
pub const ENV_PREFIX: &str = "MEMU";

/// Main configuration structure for the session manager binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

/// Where to connect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

/// Connection pool sizing, read from `MEMU_POOL_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Baseline number of persistent connections
    pub pool_size: u32,
    /// Extra connections allowed beyond `pool_size` under load
    pub max_overflow: u32,
    /// Seconds before a connection is replaced
    pub pool_recycle: u64,
    /// Seconds to wait for a free connection
    pub pool_timeout: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            max_overflow: 5,
            pool_recycle: 1800,
            pool_timeout: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(), // pretty, json, compact
        }
    }
}

/// Exact environment keys for the pool settings
pub const POOL_SIZE_KEY: &str = "MEMU_POOL_SIZE";
pub const POOL_MAX_OVERFLOW_KEY: &str = "MEMU_POOL_MAX_OVERFLOW";
pub const POOL_RECYCLE_KEY: &str = "MEMU_POOL_RECYCLE";
pub const POOL_TIMEOUT_KEY: &str = "MEMU_POOL_TIMEOUT";

/// Raw string value of `key`, matched case-sensitively.
fn lookup(key: &str, source: Option<&HashMap<String, String>>) -> Result<Option<String>> {
    match source {
        Some(vars) => Ok(vars.get(key).cloned()),
        None => match std::env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(MemuDbError::Configuration(format!("{}: {}", key, e))),
        },
    }
}

/// Parse a non-negative integer setting, falling back to `default` when unset.
///
/// Only plain decimal integers are accepted; floats, booleans and
/// exponents are rejected rather than coerced.
fn parse_setting<T>(key: &str, source: Option<&HashMap<String, String>>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key, source)? {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            MemuDbError::Configuration(format!(
                "{} must be a non-negative integer, got {:?}: {}",
                key, raw, e
            ))
        }),
    }
}

#[derive(Debug, Deserialize)]
struct DatabaseEnv {
    database_url: Option<String>,
}

/// Pre-populate the process environment from `.env` in the working directory.
///
/// A missing file is not an error; variables already set are left alone.
pub fn load_dotenv() {
    match dotenv::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    }
}

/// Same as [`load_dotenv`] but from an explicit file.
pub fn load_dotenv_from(path: &Path) -> Result<()> {
    dotenv::from_path(path)
        .map_err(|e| MemuDbError::Configuration(format!("Failed to load {}: {}", path.display(), e)))
}

/// Build a string-valued environment source, either over the process
/// environment or over an explicit map of variables.
fn environment(prefix: &str, source: Option<&HashMap<String, String>>) -> Environment {
    let env = Environment::with_prefix(prefix);
    match source {
        Some(vars) => env.source(Some(
            vars.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<config::Map<String, String>>(),
        )),
        None => env,
    }
}

impl PoolConfig {
    /// Read the pool settings from the process environment.
    ///
    /// This is the only place the pool settings touch global state.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Read the pool settings from an explicit set of variables
    pub fn from_source(vars: &HashMap<String, String>) -> Result<Self> {
        Self::load(Some(vars))
    }

    fn load(source: Option<&HashMap<String, String>>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            pool_size: parse_setting(POOL_SIZE_KEY, source, defaults.pool_size)?,
            max_overflow: parse_setting(POOL_MAX_OVERFLOW_KEY, source, defaults.max_overflow)?,
            pool_recycle: parse_setting(POOL_RECYCLE_KEY, source, defaults.pool_recycle)?,
            pool_timeout: parse_setting(POOL_TIMEOUT_KEY, source, defaults.pool_timeout)?,
        };
        debug!(?config, "Loaded pool configuration");
        Ok(config)
    }

    /// Engine options for this pool, with health-check-before-use enabled
    pub fn to_options(&self) -> EngineOptions {
        EngineOptions::from_pool_config(self)
    }
}

impl LoggingConfig {
    fn load(source: Option<&HashMap<String, String>>) -> Result<Self> {
        let loaded = ConfigBuilder::builder()
            .add_source(environment(&format!("{}_LOG", ENV_PREFIX), source))
            .build()?;

        let defaults = Self::default();
        Ok(Self {
            level: loaded.get_string("level").unwrap_or(defaults.level),
            format: loaded.get_string("format").unwrap_or(defaults.format),
        })
    }
}

impl Config {
    /// Load everything the binary needs from the process environment.
    ///
    /// The database URL comes from `MEMU_DATABASE_URL`, falling back to
    /// `DATABASE_URL`.
    pub fn load() -> Result<Self> {
        Self::load_inner(None)
    }

    /// Load from an explicit set of variables
    pub fn load_from_source(vars: &HashMap<String, String>) -> Result<Self> {
        Self::load_inner(Some(vars))
    }

    fn load_inner(source: Option<&HashMap<String, String>>) -> Result<Self> {
        let database: DatabaseEnv = ConfigBuilder::builder()
            .add_source(environment(ENV_PREFIX, source))
            .build()?
            .try_deserialize()
            .map_err(|e| MemuDbError::Configuration(e.to_string()))?;

        let url = database.database_url.or_else(|| match source {
            Some(vars) => vars.get("DATABASE_URL").cloned(),
            None => std::env::var("DATABASE_URL").ok(),
        });

        Ok(Self {
            database: DatabaseConfig { url },
            pool: PoolConfig::load(source)?,
            logging: LoggingConfig::load(source)?,
        })
    }
}

//! Database engine abstraction
//!
//! An [`Engine`] owns pooled connections and hands out sessions. The
//! production engine is [`PooledEngine`], a thin layer over a bb8 pool that
//! turns [`EngineOptions`] into pool settings.

use crate::config::PoolConfig;
use crate::db::session::Session;
use crate::error::{MemuDbError, Result};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How long a connection above the baseline may sit idle before it is closed
pub const OVERFLOW_IDLE_TIMEOUT_SECS: u64 = 600;

/// Effective options used to construct an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineOptions {
    /// Validate a pooled connection before handing it out
    pub pool_pre_ping: bool,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_recycle: u64,
    pub pool_timeout: u64,
}

impl EngineOptions {
    /// Base options for a pool configuration; pre-ping is always on here.
    pub fn from_pool_config(config: &PoolConfig) -> Self {
        Self {
            pool_pre_ping: true,
            pool_size: config.pool_size,
            max_overflow: config.max_overflow,
            pool_recycle: config.pool_recycle,
            pool_timeout: config.pool_timeout,
        }
    }

    /// Apply caller-supplied overrides, which win on key collision.
    ///
    /// Unknown option names and values of the wrong type are rejected.
    pub fn with_overrides(self, overrides: &Map<String, Value>) -> Result<Self> {
        if overrides.is_empty() {
            return Ok(self);
        }

        let mut merged = serde_json::to_value(&self)?;
        if let Value::Object(options) = &mut merged {
            options.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        serde_json::from_value(merged)
            .map_err(|e| MemuDbError::Configuration(format!("Invalid engine option: {}", e)))
    }

    /// Upper bound on simultaneously open connections
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }
}

/// A pooled database engine.
///
/// `create` is the constructor used by the session manager; `dispose`
/// consumes the engine so it cannot be used afterwards.
#[async_trait]
pub trait Engine: Send + Sync + Sized + 'static {
    type Session: Send;

    async fn create(dsn: &str, options: &EngineOptions) -> Result<Self>;

    async fn session(&self) -> Result<Self::Session>;

    async fn dispose(self) -> Result<()>;
}

/// Connection managers that can be built from a connection string
pub trait FromDsn: ManageConnection + Sized {
    fn from_dsn(dsn: &str) -> Result<Self>;
}

/// Connection pool statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    /// Current number of connections in pool
    pub size: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Number of checked-out connections
    pub active_connections: u32,
    /// Pool configuration max size
    pub max_size: u32,
}

/// bb8 builder values derived from [`EngineOptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub test_on_check_out: bool,
}

impl PoolSettings {
    /// Map engine options onto the pool builder.
    ///
    /// Values are forwarded unchanged except where bb8 would panic:
    /// `pool_size + max_overflow == 0` and `pool_timeout == 0` are rejected
    /// with [`MemuDbError::Configuration`]. A `pool_recycle` of zero
    /// disables recycling.
    pub fn from_options(options: &EngineOptions) -> Result<Self> {
        let max_size = options.max_connections();
        if max_size == 0 {
            return Err(MemuDbError::Configuration(
                "pool_size + max_overflow must be greater than zero".to_string(),
            ));
        }
        if options.pool_timeout == 0 {
            return Err(MemuDbError::Configuration(
                "pool_timeout must be greater than zero".to_string(),
            ));
        }

        let max_lifetime = match options.pool_recycle {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            max_size,
            min_idle: options.pool_size.min(max_size),
            connection_timeout: Duration::from_secs(options.pool_timeout),
            idle_timeout: Duration::from_secs(OVERFLOW_IDLE_TIMEOUT_SECS),
            max_lifetime,
            test_on_check_out: options.pool_pre_ping,
        })
    }
}

/// Engine backed by a bb8 pool of `M` connections
pub struct PooledEngine<M: ManageConnection> {
    pool: Pool<M>,
    max_size: u32,
}

impl<M: ManageConnection> fmt::Debug for PooledEngine<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEngine")
            .field("pool", &"Pool<..>")
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl<M> PooledEngine<M>
where
    M: ManageConnection,
    M::Error: fmt::Display,
{
    /// Build the pool around an existing connection manager.
    ///
    /// Connections are opened lazily; the pool fills towards `pool_size`
    /// in the background. See [`PoolSettings::from_options`] for the values
    /// that are rejected instead of forwarded.
    pub fn with_manager(manager: M, options: &EngineOptions) -> Result<Self> {
        let settings = PoolSettings::from_options(options)?;

        let pool = Pool::builder()
            .max_size(settings.max_size)
            .min_idle(Some(settings.min_idle))
            .connection_timeout(settings.connection_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .max_lifetime(settings.max_lifetime)
            .test_on_check_out(settings.test_on_check_out)
            .build_unchecked(manager);

        debug!(?settings, "Built connection pool");
        Ok(Self {
            pool,
            max_size: settings.max_size,
        })
    }

    /// Get connection pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.pool.state();

        PoolStats {
            size: state.connections,
            idle_connections: state.idle_connections,
            active_connections: state.connections.saturating_sub(state.idle_connections),
            max_size: self.max_size,
        }
    }
}

#[async_trait]
impl<M> Engine for PooledEngine<M>
where
    M: FromDsn,
    M::Error: fmt::Display,
{
    type Session = Session<M>;

    async fn create(dsn: &str, options: &EngineOptions) -> Result<Self> {
        let manager = M::from_dsn(dsn)?;
        Self::with_manager(manager, options)
    }

    #[instrument(skip(self))]
    async fn session(&self) -> Result<Session<M>> {
        match self.pool.get_owned().await {
            Ok(conn) => {
                let session = Session::new(conn);
                debug!(session_id = %session.id(), "Acquired pooled connection");
                Ok(session)
            }
            Err(bb8::RunError::User(e)) => Err(MemuDbError::Engine(format!(
                "Connection manager error: {}",
                e
            ))),
            Err(bb8::RunError::TimedOut) => {
                warn!("Connection pool timeout - consider increasing pool size or timeout");
                Err(MemuDbError::Timeout)
            }
        }
    }

    #[instrument(skip(self))]
    async fn dispose(self) -> Result<()> {
        let stats = self.stats();
        if stats.active_connections > 0 {
            warn!(
                active = stats.active_connections,
                "Disposing engine with checked-out connections; they close when returned"
            );
        }

        // bb8 has no explicit shutdown; dropping the last handle closes idle connections
        drop(self.pool);

        info!(closed_idle = stats.idle_connections, "Engine disposed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overrides(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_options_from_pool_config() {
        let options = EngineOptions::from_pool_config(&PoolConfig::default());

        assert!(options.pool_pre_ping);
        assert_eq!(options.pool_size, 3);
        assert_eq!(options.max_overflow, 5);
        assert_eq!(options.pool_recycle, 1800);
        assert_eq!(options.pool_timeout, 30);
        assert_eq!(options.max_connections(), 8);
    }

    #[test]
    fn test_override_wins() {
        let options = EngineOptions::from_pool_config(&PoolConfig::default())
            .with_overrides(&overrides(json!({ "pool_size": 99, "pool_pre_ping": false })))
            .unwrap();

        assert_eq!(options.pool_size, 99);
        assert!(!options.pool_pre_ping);
        assert_eq!(options.max_overflow, 5);
    }

    #[test]
    fn test_unknown_override_rejected() {
        let result = EngineOptions::from_pool_config(&PoolConfig::default())
            .with_overrides(&overrides(json!({ "echo": true })));

        assert!(matches!(result, Err(MemuDbError::Configuration(_))));
    }

    #[test]
    fn test_ill_typed_override_rejected() {
        let result = EngineOptions::from_pool_config(&PoolConfig::default())
            .with_overrides(&overrides(json!({ "pool_size": "many" })));

        assert!(matches!(result, Err(MemuDbError::Configuration(_))));
    }

    #[test]
    fn test_pool_settings_mapping() {
        let options = EngineOptions::from_pool_config(&PoolConfig::default());
        let settings = PoolSettings::from_options(&options).unwrap();

        assert_eq!(settings.max_size, 8);
        assert_eq!(settings.min_idle, 3);
        assert_eq!(settings.connection_timeout, Duration::from_secs(30));
        assert_eq!(settings.idle_timeout, Duration::from_secs(OVERFLOW_IDLE_TIMEOUT_SECS));
        assert_eq!(settings.max_lifetime, Some(Duration::from_secs(1800)));
        assert!(settings.test_on_check_out);
    }

    #[test]
    fn test_pool_settings_follow_overrides() {
        let options = EngineOptions::from_pool_config(&PoolConfig::default())
            .with_overrides(&overrides(json!({ "pool_pre_ping": false, "pool_recycle": 0 })))
            .unwrap();
        let settings = PoolSettings::from_options(&options).unwrap();

        assert!(!settings.test_on_check_out);
        assert_eq!(settings.max_lifetime, None);
    }

    #[test]
    fn test_pool_settings_reject_zero_timeout_and_size() {
        let mut options = EngineOptions::from_pool_config(&PoolConfig::default());
        options.pool_timeout = 0;
        assert!(matches!(
            PoolSettings::from_options(&options),
            Err(MemuDbError::Configuration(_))
        ));

        let mut options = EngineOptions::from_pool_config(&PoolConfig::default());
        options.pool_size = 0;
        options.max_overflow = 0;
        assert!(matches!(
            PoolSettings::from_options(&options),
            Err(MemuDbError::Configuration(_))
        ));
    }

    #[test]
    fn test_max_connections_saturates() {
        let options = EngineOptions {
            pool_pre_ping: true,
            pool_size: u32::MAX,
            max_overflow: 1,
            pool_recycle: 0,
            pool_timeout: 1,
        };
        assert_eq!(options.max_connections(), u32::MAX);
    }
}

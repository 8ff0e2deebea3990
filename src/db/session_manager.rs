//! Engine lifecycle and session creation

use crate::config::PoolConfig;
use crate::db::engine::{Engine, EngineOptions};
use crate::db::PgEngine;
use crate::error::{MemuDbError, Result};
use serde_json::{Map, Value};
use tracing::{error, info, instrument};

/// Owns one engine for its whole lifetime and hands out sessions.
///
/// Sessions are independent: the manager does not track them once returned.
/// `close` consumes the manager, so it cannot be used after shutdown.
#[derive(Debug)]
pub struct SessionManager<E: Engine = PgEngine> {
    engine: E,
    options: EngineOptions,
}

impl<E: Engine> SessionManager<E> {
    /// Construct the engine from a DSN and pool configuration.
    ///
    /// `overrides` replace computed engine options on key collision. Any
    /// engine construction failure is returned as-is; there is no retry.
    #[instrument(skip_all)]
    pub async fn new(
        dsn: &str,
        pool_config: PoolConfig,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<Self> {
        if dsn.trim().is_empty() {
            return Err(MemuDbError::Configuration("dsn must not be empty".to_string()));
        }

        let mut options = pool_config.to_options();
        if let Some(overrides) = overrides {
            options = options.with_overrides(overrides)?;
        }

        info!(
            "Creating Postgres engine with pool settings: pool_size={}, max_overflow={}",
            options.pool_size, options.max_overflow
        );

        let engine = E::create(dsn, &options).await?;
        Ok(Self { engine, options })
    }

    /// Same as [`SessionManager::new`] with the pool configuration read from
    /// the `MEMU_POOL_*` environment variables.
    pub async fn from_env(dsn: &str, overrides: Option<&Map<String, Value>>) -> Result<Self> {
        let pool_config = PoolConfig::from_env()?;
        Self::new(dsn, pool_config, overrides).await
    }

    /// A new session from the engine's pool.
    ///
    /// Waits up to `pool_timeout` seconds when the pool is exhausted.
    pub async fn session(&self) -> Result<E::Session> {
        self.engine.session().await
    }

    /// Dispose of the engine. Never fails: disposal errors are logged and
    /// dropped so shutdown paths stay simple.
    pub async fn close(self) {
        if let Err(e) = self.engine.dispose().await {
            error!(error = %e, "Failed to close Postgres engine");
        }
    }

    /// Options the engine was built with
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

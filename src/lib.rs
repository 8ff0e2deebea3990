pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use crate::config::{Config, PoolConfig};
pub use db::{Engine, EngineOptions, PgEngine, PgSession, PoolStats, PooledEngine, Session, SessionManager};
pub use error::{MemuDbError, Result};

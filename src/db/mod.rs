//! Database engine and session management
//!
//! This module wraps a bb8 pool of sqlx Postgres connections behind a
//! small session manager.

pub mod connection_manager;
pub mod engine;
pub mod session;
pub mod session_manager;

pub use connection_manager::{ConnectionManagerError, PgConnectionManager};
pub use engine::{Engine, EngineOptions, FromDsn, PoolSettings, PoolStats, PooledEngine};
pub use session::Session;
pub use session_manager::SessionManager;

/// Postgres engine over a bb8 pool
pub type PgEngine = PooledEngine<PgConnectionManager>;

/// Session holding a pooled Postgres connection
pub type PgSession = Session<PgConnectionManager>;

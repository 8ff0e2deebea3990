use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemuDbError>;

#[derive(Error, Debug)]
pub enum MemuDbError {
    // Configuration loading and option merging
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Engine and session acquisition
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Timeout waiting for a pooled connection")]
    Timeout,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MemuDbError {
    /// Wrap any engine-side failure, keeping its message.
    pub fn engine(err: impl std::fmt::Display) -> Self {
        MemuDbError::Engine(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert!(MemuDbError::Timeout.to_string().contains("Timeout"));

        let err = MemuDbError::Configuration("MEMU_POOL_SIZE".to_string());
        assert!(err.to_string().contains("MEMU_POOL_SIZE"));

        let err = MemuDbError::engine("connection refused");
        assert_eq!(err.to_string(), "Engine error: connection refused");
    }
}

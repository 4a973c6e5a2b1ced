//! Error types for the orchestrator

use thiserror::Error;

/// Main error type for orchestrator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// State storage command error
    #[error("state storage error: {0}")]
    Store(#[from] deadpool_redis::redis::RedisError),

    /// State storage connection pool error
    #[error("state storage pool error: {0}")]
    StorePool(#[from] deadpool_redis::PoolError),

    /// State storage pool construction error
    #[error("state storage setup error: {0}")]
    StoreSetup(#[from] deadpool_redis::CreatePoolError),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A profile ID that does not carry both halves of the
    /// `<matchObjectID>.<profileID>` form
    #[error("invalid profile id {0:?}: expected \"<matchObjectID>.<profileID>\"")]
    InvalidProfileId(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

//! Shared state storage access
//!
//! The orchestrator shares a Redis instance with the rest of the matchmaker
//! platform: the profile queue it drains, the proposal queue it watches, and
//! the in-flight worker counter all live there. Access goes through the
//! [`StateStore`] trait so the control loop can be tested against a mock;
//! the production implementation holds a bounded connection pool and runs
//! one command per pooled connection.

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, AsyncCommands};
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Trait abstracting the state storage commands the orchestrator issues
///
/// This trait allows mocking state storage in tests while using the real
/// pooled client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Atomically pop up to `count` members from the set at `queue`.
    async fn pop_profiles(&self, queue: &str, count: usize) -> Result<Vec<String>>;

    /// Read the string value at `key`. `None` means the key is absent,
    /// which callers treat differently from a zero value.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Increment the integer at `key`, creating it at zero first if absent.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// The number of members in the set at `key`.
    async fn cardinality(&self, key: &str) -> Result<u64>;
}

/// Production state storage backed by a bounded Redis connection pool.
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Connect to Redis at `url` and verify the connection with a PING.
    ///
    /// Startup connectivity is load-bearing: the orchestrator cannot make
    /// progress without its store, so a failure here is fatal to the caller.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PoolConfig::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        let mut conn = pool.get().await?;
        cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn pop_profiles(&self, queue: &str, count: usize) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let ids: Vec<String> = cmd("SPOP")
            .arg(queue)
            .arg(count)
            .query_async(&mut conn)
            .await?;
        debug!(queue = %queue, popped = ids.len(), "Popped profile ids");
        Ok(ids)
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn cardinality(&self, key: &str) -> Result<u64> {
        let mut conn = self.pool.get().await?;
        let count: u64 = conn.scard(key).await?;
        Ok(count)
    }
}

//! Key-value store abstraction shared by the allocator and the rate limiter.
//!
//! The store is the only shared mutable state in the service. Every operation
//! is atomic at the single-key level; nothing here spans multiple keys.

mod memory;
mod redis;
mod timeout;

#[cfg(test)]
pub(crate) mod testing;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::timeout::TimeoutStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The Redis backend reported an error or the connection failed
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// The call did not finish within its deadline
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// A counter key holds something that is not an integer
    #[error("Value at key '{key}' is not an integer")]
    InvalidValue { key: String },
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Narrow key-value contract the service is built on.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the value at `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditionally write `value` at `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Write `value` only if `key` is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Atomically increment the integer at `key`, creating it at 1.
    ///
    /// An existing time-to-live is left untouched.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Set the remaining time-to-live of an existing key.
    ///
    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Set a time-to-live on `key` only if it exists and has none.
    ///
    /// Returns whether a deadline was applied.
    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Short name used in logs.
    fn backend_name(&self) -> &'static str;
}

/// Build the configured store, wrapped with the per-call deadline if one is set.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn Store>> {
    let timeout = config.operation_timeout();

    let store = match config.backend {
        StoreBackend::Memory => with_deadline(MemoryStore::new(), timeout),
        StoreBackend::Redis => with_deadline(RedisStore::connect(&config.redis_url).await?, timeout),
    };

    info!(
        backend = store.backend_name(),
        timeout_ms = config.operation_timeout_ms,
        "Store initialized"
    );

    Ok(store)
}

fn with_deadline<S: Store + 'static>(store: S, timeout: Option<Duration>) -> Arc<dyn Store> {
    match timeout {
        Some(timeout) => Arc::new(TimeoutStore::new(store, timeout)),
        None => Arc::new(store),
    }
}

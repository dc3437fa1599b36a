//! Per-call deadline for store operations.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{Store, StoreError, StoreResult};

/// Wraps a store so that every call fails with [`StoreError::Timeout`] when it
/// runs longer than the configured deadline.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: Store> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, key: &str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    key = %key,
                    backend = self.inner.backend_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<S: Store> Store for TimeoutStore<S> {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.bounded("set", key, self.inner.set(key, value, ttl)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded("set_if_absent", key, self.inner.set_if_absent(key, value, ttl))
            .await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.bounded("incr", key, self.inner.incr(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded("expire", key, self.inner.expire(key, ttl)).await
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded("expire_if_unset", key, self.inner.expire_if_unset(key, ttl))
            .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.bounded("ping", "", self.inner.ping()).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

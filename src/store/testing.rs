//! Store doubles shared by unit tests.

use async_trait::async_trait;
use std::time::Duration;

use super::{Store, StoreError, StoreResult};

/// Store that fails every call, as if the backend were down.
pub(crate) struct UnavailableStore;

fn unavailable<T>() -> StoreResult<T> {
    Err(StoreError::Timeout(Duration::from_millis(1)))
}

#[async_trait]
impl Store for UnavailableStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        unavailable()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        unavailable()
    }

    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<bool> {
        unavailable()
    }

    async fn incr(&self, _key: &str) -> StoreResult<i64> {
        unavailable()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        unavailable()
    }

    async fn expire_if_unset(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        unavailable()
    }

    async fn ping(&self) -> StoreResult<()> {
        unavailable()
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}

//! Redis-backed store.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::{debug, info};

use super::{Store, StoreResult};

/// Store backed by a shared Redis server.
///
/// The connection manager multiplexes every request over one connection and
/// reconnects on its own after failures; cloning it is cheap.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Open a managed connection to `url`.
    ///
    /// `rediss://` URLs connect over TLS.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;

        let store = Self { manager };
        store.ping().await?;
        info!("Connected to Redis");

        Ok(store)
    }

    fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

/// PEXPIRE only when PTTL reports a key without expiry (-1).
static EXPIRE_IF_UNSET: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('PTTL', KEYS[1]) == -1 then
            return redis.call('PEXPIRE', KEYS[1], ARGV[1])
        end
        return 0
        ",
    )
});

/// Redis millisecond TTLs must be at least 1.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection();
        let _: () = conn.pset_ex(key, value, ttl_millis(ttl)).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        debug!(key = %key, written = reply.is_some(), "SET NX");
        Ok(reply.is_some())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection();
        let count: i64 = conn.incr(key, 1).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection();
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        let applied: bool = conn.pexpire(key, millis).await?;
        Ok(applied)
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection();
        let applied: i64 = EXPIRE_IF_UNSET
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

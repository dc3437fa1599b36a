//! Short code allocation and resolution.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

use super::code;
use super::link::{compose_short_url, ShortLink};
use crate::config::TinyUrlConfig;
use crate::error::{Result, TinyUrlError};
use crate::ratelimit::COUNTER_PREFIX;
use crate::store::Store;

const CONFLICT_MESSAGE: &str = "Short code already exists. Try another one!";
const NOT_FOUND_MESSAGE: &str = "URL not found";

/// Turns long URLs into short codes and back.
///
/// Mappings are stored under the bare code with the configured lifetime.
/// By default a random code is written unconditionally, so a collision with
/// a live code overwrites it. With collision checking enabled every write is
/// a set-if-absent and colliding random codes are regenerated.
pub struct CodeAllocator {
    /// Shared key-value store
    store: Arc<dyn Store>,
    /// Prefix for composed short URLs
    base_url: String,
    /// Lifetime of new mappings
    link_ttl: Duration,
    /// Use set-if-absent writes
    collision_check: bool,
    /// Random codes tried per call when `collision_check` is on
    max_attempts: u32,
}

impl CodeAllocator {
    /// Create an allocator with unconditional writes.
    pub fn new(store: Arc<dyn Store>, base_url: impl Into<String>, link_ttl: Duration) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            link_ttl,
            collision_check: false,
            max_attempts: 1,
        }
    }

    /// Create an allocator from the service configuration.
    pub fn from_config(store: Arc<dyn Store>, config: &TinyUrlConfig) -> Self {
        let allocator = Self::new(store, config.server.base_url.clone(), config.links.expiry());
        if config.allocation.collision_check {
            allocator.with_collision_check(config.allocation.max_attempts)
        } else {
            allocator
        }
    }

    /// Switch to set-if-absent writes, retrying random codes up to `max_attempts` times.
    pub fn with_collision_check(mut self, max_attempts: u32) -> Self {
        self.collision_check = true;
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Lifetime given to new mappings.
    pub fn link_ttl(&self) -> Duration {
        self.link_ttl
    }

    /// Map `long_url` to a short code.
    ///
    /// A non-empty `requested` code is used verbatim and fails with
    /// [`TinyUrlError::CodeConflict`] if it is taken; otherwise a random code
    /// is generated. Reserved or unroutable codes are rejected as invalid input.
    #[instrument(skip(self, long_url))]
    pub async fn allocate(&self, long_url: &str, requested: Option<&str>) -> Result<ShortLink> {
        let start = Instant::now();

        if long_url.is_empty() {
            return Err(TinyUrlError::InvalidInput("long_url is required".to_string()));
        }

        let code = match requested.filter(|code| !code.is_empty()) {
            Some(code) => {
                code::check_requested(code)?;
                self.claim_requested(code, long_url).await?;
                code.to_string()
            }
            None => self.claim_random(long_url).await?,
        };

        let short_url = compose_short_url(&self.base_url, &code);
        let link = ShortLink::new(code, short_url, long_url.to_string(), self.link_ttl);

        debug!(
            code = %link.code,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Shorten processed"
        );

        Ok(link)
    }

    /// Look up the target of `code`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, code: &str) -> Result<String> {
        if code.is_empty() {
            return Err(TinyUrlError::InvalidInput("short_code is required".to_string()));
        }
        if code.starts_with(COUNTER_PREFIX) {
            return Err(TinyUrlError::NotFound(NOT_FOUND_MESSAGE.to_string()));
        }

        match self.store.get(code).await? {
            Some(long_url) => {
                trace!(code = %code, "Resolved short code");
                Ok(long_url)
            }
            None => Err(TinyUrlError::NotFound(NOT_FOUND_MESSAGE.to_string())),
        }
    }

    async fn claim_requested(&self, code: &str, long_url: &str) -> Result<()> {
        if self.collision_check {
            if !self.store.set_if_absent(code, long_url, self.link_ttl).await? {
                return Err(conflict());
            }
            return Ok(());
        }

        if self.store.get(code).await?.is_some() {
            return Err(conflict());
        }

        self.store.set(code, long_url, self.link_ttl).await?;
        Ok(())
    }

    async fn claim_random(&self, long_url: &str) -> Result<String> {
        if !self.collision_check {
            let code = code::generate();
            self.store.set(&code, long_url, self.link_ttl).await?;
            return Ok(code);
        }

        for attempt in 1..=self.max_attempts {
            let code = code::generate();
            if self.store.set_if_absent(&code, long_url, self.link_ttl).await? {
                return Ok(code);
            }
            warn!(code = %code, attempt, "Generated short code collided");
        }

        Err(TinyUrlError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}

fn conflict() -> TinyUrlError {
    TinyUrlError::CodeConflict(CONFLICT_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortener::code::{ALPHABET, CODE_LENGTH};
    use crate::store::testing::UnavailableStore;
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const BASE: &str = "http://localhost:7860";
    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn create_test_allocator() -> (Arc<MemoryStore>, CodeAllocator) {
        let store = Arc::new(MemoryStore::new());
        let allocator = CodeAllocator::new(store.clone(), BASE, DAY);
        (store, allocator)
    }

    /// Store whose set-if-absent refuses the first `refusals` writes.
    struct CollidingStore {
        inner: MemoryStore,
        refusals: u32,
        attempts: AtomicU32,
    }

    impl CollidingStore {
        fn new(refusals: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                refusals,
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Store for CollidingStore {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.refusals {
                return Ok(false);
            }
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn incr(&self, key: &str) -> StoreResult<i64> {
            self.inner.incr(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
            self.inner.expire(key, ttl).await
        }

        async fn expire_if_unset(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
            self.inner.expire_if_unset(key, ttl).await
        }

        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "colliding"
        }
    }

    #[tokio::test]
    async fn test_allocate_random_code_roundtrip() {
        let (_store, allocator) = create_test_allocator();

        let link = allocator.allocate("https://example.com", None).await.unwrap();

        assert_eq!(link.code.len(), CODE_LENGTH);
        assert!(link.code.bytes().all(|b| ALPHABET.contains(&b)));
        assert_eq!(link.short_url, format!("{}/{}", BASE, link.code));
        assert_eq!(link.long_url, "https://example.com");
        assert_eq!(link.expires_in_hours(), 24);

        let resolved = allocator.resolve(&link.code).await.unwrap();
        assert_eq!(resolved, "https://example.com");
    }

    #[tokio::test]
    async fn test_allocate_empty_url_rejected() {
        let (store, allocator) = create_test_allocator();

        let err = allocator.allocate("", None).await.unwrap_err();
        assert!(matches!(err, TinyUrlError::InvalidInput(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_requested_code_used_verbatim() {
        let (_store, allocator) = create_test_allocator();

        let link = allocator
            .allocate("https://example.com", Some("my-link"))
            .await
            .unwrap();

        assert_eq!(link.code, "my-link");
        assert_eq!(link.short_url, "http://localhost:7860/my-link");
        assert_eq!(allocator.resolve("my-link").await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn test_requested_code_conflict() {
        let (_store, allocator) = create_test_allocator();

        allocator
            .allocate("https://first.example", Some("taken"))
            .await
            .unwrap();
        let err = allocator
            .allocate("https://second.example", Some("taken"))
            .await
            .unwrap_err();

        assert!(matches!(err, TinyUrlError::CodeConflict(ref msg) if msg.contains("Try another one")));
        // The original mapping is untouched
        assert_eq!(allocator.resolve("taken").await.unwrap(), "https://first.example");
    }

    #[tokio::test]
    async fn test_empty_requested_code_generates() {
        let (_store, allocator) = create_test_allocator();

        let link = allocator.allocate("https://example.com", Some("")).await.unwrap();
        assert_eq!(link.code.len(), CODE_LENGTH);
    }

    #[tokio::test]
    async fn test_requested_code_cannot_touch_counters() {
        let (store, allocator) = create_test_allocator();
        let counter = "rate_limit:203.0.113.7";
        store.incr(counter).await.unwrap();

        let err = allocator
            .allocate("https://example.com", Some(counter))
            .await
            .unwrap_err();
        assert!(matches!(err, TinyUrlError::InvalidInput(_)));
        assert_eq!(store.incr(counter).await.unwrap(), 2);

        let err = allocator.resolve(counter).await.unwrap_err();
        assert!(matches!(err, TinyUrlError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unroutable_requested_code_rejected() {
        let (store, allocator) = create_test_allocator();

        for code in ["healthz", "a/b"] {
            let err = allocator
                .allocate("https://example.com", Some(code))
                .await
                .unwrap_err();
            assert!(matches!(err, TinyUrlError::InvalidInput(_)));
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_unknown_code() {
        let (_store, allocator) = create_test_allocator();

        let err = allocator.resolve("nothing-here").await.unwrap_err();
        assert!(matches!(err, TinyUrlError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_empty_code() {
        let (_store, allocator) = create_test_allocator();

        let err = allocator.resolve("").await.unwrap_err();
        assert!(matches!(err, TinyUrlError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_expires() {
        let store = Arc::new(MemoryStore::new());
        let allocator = CodeAllocator::new(store, BASE, Duration::from_secs(3600));

        let link = allocator.allocate("https://example.com", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(allocator.resolve(&link.code).await.is_ok());

        tokio::time::advance(Duration::from_secs(1)).await;
        let err = allocator.resolve(&link.code).await.unwrap_err();
        assert!(matches!(err, TinyUrlError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let allocator = CodeAllocator::new(Arc::new(UnavailableStore), BASE, DAY);

        let err = allocator.allocate("https://example.com", None).await.unwrap_err();
        assert!(matches!(err, TinyUrlError::StoreUnavailable(_)));

        let err = allocator
            .allocate("https://example.com", Some("code"))
            .await
            .unwrap_err();
        assert!(matches!(err, TinyUrlError::StoreUnavailable(_)));

        let err = allocator.resolve("code").await.unwrap_err();
        assert!(matches!(err, TinyUrlError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_collision_check_retries() {
        let store = Arc::new(CollidingStore::new(2));
        let allocator = CodeAllocator::new(store.clone(), BASE, DAY).with_collision_check(5);

        let link = allocator.allocate("https://example.com", None).await.unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(allocator.resolve(&link.code).await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn test_collision_check_exhausted() {
        let store = Arc::new(CollidingStore::new(u32::MAX));
        let allocator = CodeAllocator::new(store.clone(), BASE, DAY).with_collision_check(3);

        let err = allocator.allocate("https://example.com", None).await.unwrap_err();

        assert!(matches!(err, TinyUrlError::AllocationExhausted { attempts: 3 }));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_collision_check_requested_conflict() {
        let store = Arc::new(MemoryStore::new());
        let allocator = CodeAllocator::new(store, BASE, DAY).with_collision_check(3);

        allocator.allocate("https://a.example", Some("dup")).await.unwrap();
        let err = allocator.allocate("https://b.example", Some("dup")).await.unwrap_err();

        assert!(matches!(err, TinyUrlError::CodeConflict(_)));
        assert_eq!(allocator.resolve("dup").await.unwrap(), "https://a.example");
    }

    #[tokio::test]
    async fn test_from_config() {
        let mut config = TinyUrlConfig::default();
        config.server.base_url = "https://sho.rt/".to_string();
        config.links.expiry_hours = 2;
        config.allocation.collision_check = true;
        config.allocation.max_attempts = 4;

        let allocator = CodeAllocator::from_config(Arc::new(MemoryStore::new()), &config);

        assert_eq!(allocator.link_ttl(), Duration::from_secs(7200));
        assert!(allocator.collision_check);
        assert_eq!(allocator.max_attempts, 4);

        let link = allocator.allocate("https://example.com", Some("x")).await.unwrap();
        assert_eq!(link.short_url, "https://sho.rt/x");
    }
}

//! In-process store with expiry.
//!
//! Backed by a `DashMap`, so every operation on one key runs under that
//! key's shard lock and is atomic. Expired entries are purged when touched by
//! `get` and by a full sweep every few thousand writes. Deadlines use
//! `tokio::time::Instant` and follow paused test time.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Store, StoreError, StoreResult};

/// Writes between two sweeps of expired keys.
const DEFAULT_SWEEP_INTERVAL: u64 = 4096;

/// A stored value and its optional deadline.
#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// A ttl too large to represent never expires.
fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

/// Single-instance store for development and tests.
#[derive(Debug)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
    writes: AtomicU64,
    sweep_interval: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired keys after every `interval` writes.
    pub fn with_sweep_interval(interval: u64) -> Self {
        Self {
            slots: DashMap::new(),
            writes: AtomicU64::new(0),
            sweep_interval: interval.max(1),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|slot| !slot.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.slots.retain(|_, slot| {
            let live = !slot.is_expired(now);
            if !live {
                removed += 1;
            }
            live
        });
        if removed > 0 {
            debug!(removed, remaining = self.slots.len(), "Swept expired keys");
        }
        removed
    }

    /// Must be called with no shard guard held.
    fn record_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.sweep_interval == 0 {
            self.purge_expired();
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();

        match self.slots.get(key) {
            None => return Ok(None),
            Some(slot) if !slot.is_expired(now) => return Ok(Some(slot.value.clone())),
            Some(_) => {}
        }

        trace!(key = %key, "Purging expired key");
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: deadline(Instant::now(), ttl),
            },
        );
        self.record_write();
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let slot = Slot {
            value: value.to_string(),
            expires_at: deadline(now, ttl),
        };

        let written = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(slot);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                true
            }
        };

        if written {
            self.record_write();
        }
        Ok(written)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        let next = {
            let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
                value: "0".to_string(),
                expires_at: None,
            });

            if slot.is_expired(now) {
                slot.value = "0".to_string();
                slot.expires_at = None;
            }

            let current: i64 = slot.value.parse().map_err(|_| StoreError::InvalidValue {
                key: key.to_string(),
            })?;
            let next = current + 1;
            slot.value = next.to_string();
            next
        };

        self.record_write();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();

        match self.slots.get_mut(key) {
            Some(mut slot) if !slot.is_expired(now) => {
                slot.expires_at = deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();

        match self.slots.get_mut(key) {
            Some(mut slot) if slot.expires_at.is_none() => {
                slot.expires_at = deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

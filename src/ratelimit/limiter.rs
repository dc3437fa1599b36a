//! Store-backed fixed window rate limiter.

use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

use super::client::ClientKey;
use super::window::{Admission, RateWindow};
use crate::config::RateLimitConfig;
use crate::store::Store;

/// Rate limiter keeping one counter per client in the shared store.
///
/// Each check is an atomic INCR on `rate_limit:{client}`. The increment that
/// creates the counter also sets its expiry, so the window runs from the
/// client's first request and later requests never extend it. Requests over
/// the limit still count.
///
/// If that first expiry was lost the counter would never reset, so a denied
/// request gives the counter a fresh window when it has no deadline.
///
/// When the store cannot be reached the request is admitted and the error
/// logged: availability wins over strict enforcement.
pub struct RateLimiter {
    /// Shared key-value store
    store: Arc<dyn Store>,
    /// Limit and window length
    window: RateWindow,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, window: RateWindow) -> Self {
        Self { store, window }
    }

    pub fn from_config(store: Arc<dyn Store>, config: &RateLimitConfig) -> Self {
        Self::new(store, RateWindow::from_config(config))
    }

    pub fn window(&self) -> RateWindow {
        self.window
    }

    /// Count one request for `client` and decide whether it may proceed.
    #[instrument(skip(self, client), fields(client = %client))]
    pub async fn admit(&self, client: &ClientKey) -> Admission {
        let key = client.storage_key();

        let count = match self.store.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    key = %key,
                    backend = self.store.backend_name(),
                    error = %e,
                    "Rate limit counter unavailable, admitting request"
                );
                return Admission::FailedOpen;
            }
        };

        if count == 1 {
            match self.store.expire(&key, self.window.duration()).await {
                Ok(true) => {
                    trace!(key = %key, window = ?self.window.duration(), "Rate window opened");
                }
                Ok(false) => {
                    warn!(key = %key, "Rate limit counter vanished before its expiry was set");
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        error = %e,
                        "Failed to set rate window expiry, admitting request"
                    );
                    return Admission::FailedOpen;
                }
            }
        }

        let count = u64::try_from(count).unwrap_or(0);

        if self.window.admits(count) {
            Admission::Allowed {
                count,
                remaining: self.window.remaining(count),
            }
        } else {
            debug!(
                key = %key,
                count,
                limit = self.window.max_requests(),
                "Rate limit exceeded"
            );
            self.repair_window(&key).await;
            Admission::Denied { count }
        }
    }

    async fn repair_window(&self, key: &str) {
        match self.store.expire_if_unset(key, self.window.duration()).await {
            Ok(true) => {
                warn!(key = %key, "Rate limit counter had no expiry, window restarted");
            }
            Ok(false) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to check rate window expiry");
            }
        }
    }
}

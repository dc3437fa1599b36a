//! The short link model.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A stored mapping from a short code to its target URL.
///
/// Links are immutable once written and disappear when the store expires
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortLink {
    /// Code appended to the base URL
    pub code: String,
    /// Full short URL, `{base_url}/{code}`
    pub short_url: String,
    /// Redirect target
    pub long_url: String,
    /// Lifetime granted at creation
    pub ttl: Duration,
    /// Wall-clock instant the link stops resolving
    pub expires_at: DateTime<Utc>,
}

impl ShortLink {
    /// Create a link expiring `ttl` from now.
    pub fn new(code: String, short_url: String, long_url: String, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            code,
            short_url,
            long_url,
            ttl,
            expires_at,
        }
    }

    /// Whole hours of lifetime, as reported to clients.
    pub fn expires_in_hours(&self) -> u64 {
        self.ttl.as_secs() / 3600
    }
}

/// Join a base URL and a code without doubling the separator.
pub fn compose_short_url(base_url: &str, code: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), code)
}

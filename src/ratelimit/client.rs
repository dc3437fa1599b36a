//! Client identity used to key rate limit counters.

use std::fmt;
use std::net::IpAddr;

use crate::config::ClientIdentityConfig;

/// Prefix of every rate limit counter key in the store.
pub const COUNTER_PREFIX: &str = "rate_limit:";

/// Identity used when neither a forwarded address nor a peer address is known.
const UNKNOWN_CLIENT: &str = "unknown";

/// A key that identifies one client for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The store key holding this client's counter.
    pub fn storage_key(&self) -> String {
        format!("{}{}", COUNTER_PREFIX, self.0)
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives [`ClientKey`]s from request metadata.
///
/// The first `X-Forwarded-For` entry wins when the header is trusted;
/// otherwise the peer IP is used. The header is trusted when
/// `trust_forwarded_for` is on and either no proxies are listed or the peer
/// is one of them.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    trust_forwarded_for: bool,
    trusted_proxies: Vec<IpAddr>,
}

impl ClientIdentity {
    pub fn new(trust_forwarded_for: bool, trusted_proxies: Vec<IpAddr>) -> Self {
        Self {
            trust_forwarded_for,
            trusted_proxies,
        }
    }

    pub fn from_config(config: &ClientIdentityConfig) -> Self {
        Self::new(config.trust_forwarded_for, config.trusted_proxies.clone())
    }

    /// Resolve the key for a request with the given header value and peer.
    pub fn resolve(&self, forwarded_for: Option<&str>, peer: Option<IpAddr>) -> ClientKey {
        if self.header_trusted(peer) {
            let forwarded = forwarded_for
                .and_then(|header| header.split(',').next())
                .map(str::trim)
                .filter(|entry| !entry.is_empty());

            if let Some(entry) = forwarded {
                return ClientKey::new(entry);
            }
        }

        match peer {
            Some(ip) => ClientKey::new(ip.to_string()),
            None => ClientKey::new(UNKNOWN_CLIENT),
        }
    }

    fn header_trusted(&self, peer: Option<IpAddr>) -> bool {
        if !self.trust_forwarded_for {
            return false;
        }
        if self.trusted_proxies.is_empty() {
            return true;
        }
        peer.is_some_and(|ip| self.trusted_proxies.contains(&ip))
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self::from_config(&ClientIdentityConfig::default())
    }
}

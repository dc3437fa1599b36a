//! Configuration management for tinyurl.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `TINYURL_*` environment variables (`__` separates sections, e.g.
//! `TINYURL_SERVER__BASE_URL`).

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Result, TinyUrlError};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "TINYURL";

/// Ten years.
const MAX_EXPIRY_HOURS: u64 = 10 * 365 * 24;

/// One week.
const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// Main configuration for the tinyurl service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TinyUrlConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Key-value store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Short link lifetime
    #[serde(default)]
    pub links: LinkConfig,

    /// Code allocation behavior
    #[serde(default)]
    pub allocation: AllocationConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// How the client address is derived for rate limiting
    #[serde(default)]
    pub client_identity: ClientIdentityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Prefix used to compose short URLs
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            base_url: default_base_url(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7860))
}

fn default_base_url() -> String {
    "http://localhost:7860".to_string()
}

/// Which store implementation backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map, single instance only
    Memory,
    /// Shared Redis server
    #[default]
    Redis,
}

/// Key-value store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL (`rediss://` enables TLS)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Deadline for a single store call in milliseconds, 0 disables it
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            operation_timeout_ms: default_operation_timeout(),
        }
    }
}

impl StoreConfig {
    /// The per-call deadline, if one is configured.
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_operation_timeout() -> u64 {
    2000
}

/// Short link lifetime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Hours a mapping stays resolvable
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            expiry_hours: default_expiry_hours(),
        }
    }
}

impl LinkConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_hours.saturating_mul(3600))
    }
}

fn default_expiry_hours() -> u64 {
    24
}

/// Code allocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Write with set-if-absent and regenerate colliding random codes
    #[serde(default)]
    pub collision_check: bool,

    /// Random codes tried before giving up when `collision_check` is on
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            collision_check: false,
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Shortening requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_max_requests() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

/// Client identity configuration.
///
/// With `trust_forwarded_for` on and no `trusted_proxies`, the first
/// `X-Forwarded-For` entry is taken at face value. That is spoofable unless a
/// proxy in front of the service overwrites the header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdentityConfig {
    /// Honor the `X-Forwarded-For` header at all
    #[serde(default = "default_trust_forwarded_for")]
    pub trust_forwarded_for: bool,

    /// Peers allowed to set `X-Forwarded-For`; empty means any peer
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ClientIdentityConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_for: default_trust_forwarded_for(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_trust_forwarded_for() -> bool {
    true
}

impl TinyUrlConfig {
    /// Load configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path).format(config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("client_identity.trusted_proxies")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TinyUrlError::Config(e.to_string()))?;

        let config: TinyUrlConfig = settings
            .try_deserialize()
            .map_err(|e| TinyUrlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string, ignoring the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TinyUrlConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| TinyUrlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(TinyUrlError::Config("server.base_url must not be empty".into()));
        }
        if self.links.expiry_hours == 0 {
            return Err(TinyUrlError::Config("links.expiry_hours must be at least 1".into()));
        }
        if self.links.expiry_hours > MAX_EXPIRY_HOURS {
            return Err(TinyUrlError::Config(format!(
                "links.expiry_hours must be at most {}",
                MAX_EXPIRY_HOURS
            )));
        }
        if self.allocation.max_attempts == 0 {
            return Err(TinyUrlError::Config(
                "allocation.max_attempts must be at least 1".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(TinyUrlError::Config(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(TinyUrlError::Config(
                "rate_limit.window_secs must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_secs > MAX_WINDOW_SECS {
            return Err(TinyUrlError::Config(format!(
                "rate_limit.window_secs must be at most {}",
                MAX_WINDOW_SECS
            )));
        }
        Ok(())
    }
}

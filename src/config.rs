//! Configuration management for Gatekeeper.
//!
//! Configuration is assembled once at startup: serde defaults, then an
//! optional YAML file, then environment overrides. The result is passed
//! explicitly into the gate; nothing reads the environment per request.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::gate::TierLimits;
use crate::store::MAX_TTL;

/// Environment variable overriding the limit for address-keyed callers.
pub const ENV_LIMIT_PER_IP: &str = "RATE_LIMIT_PER_IP";
/// Environment variable overriding the limit for token-keyed callers.
pub const ENV_LIMIT_PER_TOKEN: &str = "RATE_LIMIT_PER_TOKEN";
/// Environment variable overriding the window length, in seconds.
pub const ENV_TIME_BLOCK: &str = "RATE_LIMIT_TIME_BLOCK";
pub const ENV_REDIS_HOST: &str = "REDIS_HOST";
pub const ENV_REDIS_PORT: &str = "REDIS_PORT";
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const ENV_REDIS_DB: &str = "REDIS_DB";

/// Longest accepted window, in seconds. Longer windows are capped.
pub const MAX_WINDOW_SECS: u64 = MAX_TTL.as_secs();

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Shared counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests allowed per window for callers identified by address
    #[serde(default = "default_limit_per_ip")]
    pub limit_per_ip: u64,

    /// Requests allowed per window for callers presenting a token
    #[serde(default = "default_limit_per_token")]
    pub limit_per_token: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Upper bound on each counter store round-trip, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Header carrying the caller's API token
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Header carrying the forwarded client address
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit_per_ip: default_limit_per_ip(),
            limit_per_token: default_limit_per_token(),
            window_secs: default_window_secs(),
            store_timeout_ms: default_store_timeout_ms(),
            token_header: default_token_header(),
            forwarded_header: default_forwarded_header(),
        }
    }
}

fn default_limit_per_ip() -> u64 {
    1
}

fn default_limit_per_token() -> u64 {
    2
}

fn default_window_secs() -> u64 {
    5
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_token_header() -> String {
    "api_key".to_string()
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

impl RateLimitingConfig {
    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// The store round-trip timeout as a [`Duration`].
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Replace unusable limits with safe values.
    ///
    /// A zero limit or window falls back to its default, and the window is
    /// capped at [`MAX_WINDOW_SECS`]. Each correction is logged.
    fn sanitize(&mut self) {
        self.limit_per_ip =
            positive_or_default("limit_per_ip", self.limit_per_ip, default_limit_per_ip());
        self.limit_per_token =
            positive_or_default("limit_per_token", self.limit_per_token, default_limit_per_token());
        self.window_secs =
            positive_or_default("window_secs", self.window_secs, default_window_secs());

        if self.window_secs > MAX_WINDOW_SECS {
            warn!(
                window_secs = self.window_secs,
                max = MAX_WINDOW_SECS,
                "Capping rate limit window"
            );
            self.window_secs = MAX_WINDOW_SECS;
        }
    }
}

fn positive_or_default(field: &str, value: u64, default: u64) -> u64 {
    if value == 0 {
        warn!(field = field, fallback = default, "Ignoring non-positive configuration value");
        default
    } else {
        value
    }
}

/// Shared counter store (Redis) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Full connection URL; overrides the individual fields when set
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_store_host")]
    pub host: String,

    #[serde(default = "default_store_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    /// Database index
    #[serde(default)]
    pub db: i64,

    /// Prefix prepended to every counter key
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_store_host(),
            port: default_store_port(),
            password: None,
            db: 0,
            key_prefix: String::new(),
        }
    }
}

fn default_store_host() -> String {
    "localhost".to_string()
}

fn default_store_port() -> u16 {
    6379
}

impl GatekeeperConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Zero limits or windows fall back to the defaults, as they do for
    /// environment overrides.
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| crate::error::GatekeeperError::Config(e.to_string()))?;
        config.rate_limiting.sanitize();
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. Malformed or non-positive numeric
    /// values are logged and ignored, leaving the previously loaded value in
    /// place; they are never fatal.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let rl = &mut self.rate_limiting;
        rl.limit_per_ip = positive_override(&lookup, ENV_LIMIT_PER_IP, rl.limit_per_ip);
        rl.limit_per_token = positive_override(&lookup, ENV_LIMIT_PER_TOKEN, rl.limit_per_token);
        rl.window_secs = positive_override(&lookup, ENV_TIME_BLOCK, rl.window_secs);
        rl.sanitize();

        let store = &mut self.store;
        if let Some(host) = lookup(ENV_REDIS_HOST) {
            store.host = host;
        }
        store.port = parsed_override(&lookup, ENV_REDIS_PORT, store.port);
        if let Some(password) = lookup(ENV_REDIS_PASSWORD) {
            store.password = Some(password);
        }
        store.db = parsed_override(&lookup, ENV_REDIS_DB, store.db);
    }

    /// Tier limits handed to the gate.
    pub fn tier_limits(&self) -> TierLimits {
        TierLimits {
            anonymous: self.rate_limiting.limit_per_ip,
            credentialed: self.rate_limiting.limit_per_token,
            window: self.rate_limiting.window(),
        }
    }
}

fn parsed_override<T, F>(lookup: &F, name: &str, current: T) -> T
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return current;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(
                variable = name,
                value = %raw,
                fallback = ?current,
                "Ignoring malformed configuration override"
            );
            current
        }
    }
}

fn positive_override<F>(lookup: &F, name: &str, current: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match parsed_override(lookup, name, current) {
        0 => {
            warn!(
                variable = name,
                fallback = current,
                "Ignoring non-positive configuration override"
            );
            current
        }
        value => value,
    }
}

//! Configuration management for the admission guard.
//!
//! Values are layered: built-in defaults, an optional YAML file, then
//! `GUARD_<SECTION>__<FIELD>` environment variables. CLI flags are applied
//! on top of the result by the binary.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GuardError, Result};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "GUARD";

/// Main configuration for the admission guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Validation configuration
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Where the client address used for rate limiting comes from
    #[serde(default)]
    pub client_ip: ClientIpSource,

    /// Cross-origin policy
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            client_ip: ClientIpSource::default(),
            cors: CorsConfig::default(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

/// Source of the client address that rate-limit keys are derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ClientIpSource {
    /// The transport-layer peer address of the connection.
    #[default]
    Peer,
    /// The nearest untrusted hop listed in a forwarding header.
    ///
    /// The header is only read when the connection comes from one of
    /// `trusted_proxies`; any other peer is keyed by its socket address.
    Header {
        #[serde(default = "default_forwarded_header")]
        name: String,
        #[serde(default = "default_trusted_proxies")]
        trusted_proxies: Vec<IpAddr>,
    },
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

fn default_trusted_proxies() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(Ipv6Addr::LOCALHOST),
    ]
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Whether browsers may send credentials
    #[serde(default = "default_true")]
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            allow_credentials: default_true(),
        }
    }
}

impl CorsConfig {
    /// Whether the origin list contains the wildcard.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

/// Rate limiting algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Continuous-refill token bucket
    #[default]
    TokenBucket,
    /// Trailing window log with a burst cap
    FixedWindow,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::TokenBucket => write!(f, "token_bucket"),
            Algorithm::FixedWindow => write!(f, "fixed_window"),
        }
    }
}

/// What identifies a rate-limited subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyGranularity {
    /// One quota per client address, shared by every user behind it
    #[default]
    Address,
    /// One quota per (user id, client address) pair
    UserAndAddress,
}

/// How the fixed-window limiter computes `Retry-After` on denial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAfterMode {
    /// Always advise waiting a whole window
    #[default]
    FullWindow,
    /// Advise the time until enough admissions age out of the window
    Precise,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Which limiter implementation to run
    #[serde(default)]
    pub algorithm: Algorithm,

    /// How keys are derived from the request
    #[serde(default)]
    pub key_granularity: KeyGranularity,

    /// Token bucket parameters
    #[serde(default)]
    pub token_bucket: TokenBucketConfig,

    /// Fixed window parameters
    #[serde(default)]
    pub fixed_window: FixedWindowConfig,

    /// Per-key state store bounds
    #[serde(default)]
    pub store: StoreConfig,
}

impl RateLimitingConfig {
    /// Time after which an untouched entry of the selected algorithm is
    /// indistinguishable from a fresh one.
    pub fn idle_horizon(&self) -> Duration {
        match self.algorithm {
            Algorithm::TokenBucket => self.token_bucket.full_refill_time(),
            Algorithm::FixedWindow => self.fixed_window.window_duration(),
        }
    }
}

/// Token bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum tokens a bucket holds
    #[serde(default = "default_burst")]
    pub burst_capacity: u32,

    /// Sustained admissions per minute; sets the refill rate
    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: u32,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            burst_capacity: default_burst(),
            max_per_minute: default_max_per_minute(),
        }
    }
}

impl TokenBucketConfig {
    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.max_per_minute) / 60.0
    }

    /// Time for an empty bucket to refill completely.
    pub fn full_refill_time(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.burst_capacity) / self.refill_rate())
    }
}

/// Fixed window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedWindowConfig {
    /// Trailing window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Admissions allowed per window
    #[serde(default = "default_max_per_minute")]
    pub max_per_window: u32,

    /// Secondary cap, checked before the per-window one
    #[serde(default = "default_burst")]
    pub burst_limit: u32,

    /// Retry-After computation on denial
    #[serde(default)]
    pub retry_after: RetryAfterMode,
}

impl Default for FixedWindowConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_per_window: default_max_per_minute(),
            burst_limit: default_burst(),
            retry_after: RetryAfterMode::default(),
        }
    }
}

impl FixedWindowConfig {
    /// Get the window duration.
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_burst() -> u32 {
    7
}

fn default_max_per_minute() -> u32 {
    22
}

fn default_window_secs() -> u64 {
    60
}

/// Bounds on the per-key state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of tracked keys
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entries untouched for this long are swept
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StoreConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_max_entries() -> usize {
    10000
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

/// Validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// The only security category this endpoint accepts
    #[serde(default = "default_category")]
    pub category: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            category: default_category(),
        }
    }
}

fn default_category() -> String {
    "Rate Limiting".to_string()
}

impl GuardConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration file");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load layered configuration: defaults, then the optional YAML file,
    /// then `GUARD_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&base)?)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors.allowed_origins"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject configurations that cannot run or that would make the sweeper
    /// change admission outcomes.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;

        if rl.token_bucket.burst_capacity == 0 {
            return Err(GuardError::Config(
                "token_bucket.burst_capacity must be at least 1".to_string(),
            ));
        }
        if rl.token_bucket.max_per_minute == 0 {
            return Err(GuardError::Config(
                "token_bucket.max_per_minute must be at least 1".to_string(),
            ));
        }
        if rl.fixed_window.window_secs == 0 {
            return Err(GuardError::Config(
                "fixed_window.window_secs must be at least 1".to_string(),
            ));
        }
        if rl.fixed_window.burst_limit == 0 || rl.fixed_window.max_per_window == 0 {
            return Err(GuardError::Config(
                "fixed_window limits must be at least 1".to_string(),
            ));
        }
        if rl.store.max_entries == 0 {
            return Err(GuardError::Config(
                "store.max_entries must be at least 1".to_string(),
            ));
        }
        if rl.store.sweep_interval_secs == 0 {
            return Err(GuardError::Config(
                "store.sweep_interval_secs must be at least 1".to_string(),
            ));
        }

        let horizon = rl.idle_horizon();
        if rl.store.idle_timeout() < horizon {
            return Err(GuardError::Config(format!(
                "store.idle_timeout_secs ({}) is shorter than the {} idle horizon ({:.1}s)",
                rl.store.idle_timeout_secs,
                rl.algorithm,
                horizon.as_secs_f64()
            )));
        }

        if let ClientIpSource::Header {
            trusted_proxies, ..
        } = &self.server.client_ip
        {
            if trusted_proxies.is_empty() {
                return Err(GuardError::Config(
                    "server.client_ip.trusted_proxies must not be empty in header mode".to_string(),
                ));
            }
        }

        if self.validation.category.is_empty() {
            return Err(GuardError::Config(
                "validation.category must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.server.client_ip, ClientIpSource::Peer);
        assert!(config.server.cors.allows_any_origin());
        assert!(config.server.cors.allow_credentials);
        assert_eq!(config.rate_limiting.algorithm, Algorithm::TokenBucket);
        assert_eq!(config.rate_limiting.key_granularity, KeyGranularity::Address);
        assert_eq!(config.rate_limiting.token_bucket.burst_capacity, 7);
        assert_eq!(config.rate_limiting.token_bucket.max_per_minute, 22);
        assert_eq!(config.rate_limiting.fixed_window.window_secs, 60);
        assert_eq!(config.rate_limiting.fixed_window.max_per_window, 22);
        assert_eq!(config.rate_limiting.fixed_window.burst_limit, 7);
        assert_eq!(
            config.rate_limiting.fixed_window.retry_after,
            RetryAfterMode::FullWindow
        );
        assert_eq!(config.validation.category, "Rate Limiting");
        assert_ok!(config.validate());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
server:
  bind_addr: "127.0.0.1:9000"
  client_ip:
    source: header
rate_limiting:
  algorithm: fixed_window
  key_granularity: user_and_address
  fixed_window:
    retry_after: precise
"#;
        let config = GuardConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(
            config.server.client_ip,
            ClientIpSource::Header {
                name: "x-forwarded-for".to_string(),
                trusted_proxies: vec![
                    "127.0.0.1".parse().unwrap(),
                    "::1".parse().unwrap()
                ],
            }
        );
        assert_eq!(config.rate_limiting.algorithm, Algorithm::FixedWindow);
        assert_eq!(
            config.rate_limiting.key_granularity,
            KeyGranularity::UserAndAddress
        );
        assert_eq!(
            config.rate_limiting.fixed_window.retry_after,
            RetryAfterMode::Precise
        );
        // Untouched sections keep their defaults
        assert_eq!(config.rate_limiting.fixed_window.window_secs, 60);
        assert_eq!(config.rate_limiting.token_bucket.burst_capacity, 7);
    }

    #[test]
    fn test_parse_trusted_proxies() {
        let yaml = r#"
server:
  client_ip:
    source: header
    name: x-real-ip
    trusted_proxies: ["10.0.0.1", "fd00::1"]
"#;
        let config = GuardConfig::from_yaml(yaml).unwrap();

        assert_eq!(
            config.server.client_ip,
            ClientIpSource::Header {
                name: "x-real-ip".to_string(),
                trusted_proxies: vec!["10.0.0.1".parse().unwrap(), "fd00::1".parse().unwrap()],
            }
        );
        assert_ok!(config.validate());
    }

    #[test]
    fn test_validate_rejects_header_mode_without_trusted_proxies() {
        let mut config = GuardConfig::default();
        config.server.client_ip = ClientIpSource::Header {
            name: "x-forwarded-for".to_string(),
            trusted_proxies: Vec::new(),
        };

        assert!(matches!(config.validate(), Err(GuardError::Config(_))));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = GuardConfig::from_yaml("rate_limiting: [not, a, map]");
        assert!(matches!(result, Err(GuardError::Config(_))));
    }

    #[test]
    fn test_refill_rate_and_horizon() {
        let bucket = TokenBucketConfig {
            burst_capacity: 6,
            max_per_minute: 30,
        };
        assert!((bucket.refill_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(bucket.full_refill_time(), Duration::from_secs(12));

        let mut rl = RateLimitingConfig::default();
        rl.algorithm = Algorithm::FixedWindow;
        assert_eq!(rl.idle_horizon(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_short_idle_timeout() {
        let mut config = GuardConfig::default();
        config.rate_limiting.algorithm = Algorithm::FixedWindow;
        config.rate_limiting.store.idle_timeout_secs = 30;

        assert!(matches!(config.validate(), Err(GuardError::Config(_))));

        config.rate_limiting.store.idle_timeout_secs = 60;
        assert_ok!(config.validate());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = GuardConfig::default();
        config.rate_limiting.token_bucket.burst_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = GuardConfig::default();
        config.rate_limiting.token_bucket.max_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = GuardConfig::default();
        config.rate_limiting.store.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = GuardConfig::default();
        config.validation.category = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("guard-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "validation:\n  category: Prompt Injection\n").unwrap();

        let config = GuardConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.validation.category, "Prompt Injection");
    }

    #[test]
    fn test_from_missing_file() {
        let result = GuardConfig::from_file("/nonexistent/guard.yaml");
        assert!(matches!(result, Err(GuardError::Io(_))));
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let path = std::env::temp_dir().join(format!("guard-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "rate_limiting:\n  token_bucket:\n    burst_capacity: 3\n",
        )
        .unwrap();

        let config = GuardConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rate_limiting.token_bucket.burst_capacity, 3);
        assert_eq!(config.rate_limiting.token_bucket.max_per_minute, 22);
    }

    #[test]
    fn test_load_keeps_file_client_ip_settings() {
        let path = std::env::temp_dir().join(format!("guard-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "server:\n  client_ip:\n    source: header\n    trusted_proxies: [\"10.0.0.1\"]\n",
        )
        .unwrap();

        let config = GuardConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            config.server.client_ip,
            ClientIpSource::Header {
                name: "x-forwarded-for".to_string(),
                trusted_proxies: vec!["10.0.0.1".parse().unwrap()],
            }
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = GuardConfig::load(Some(Path::new("/nonexistent/guard.yaml")));
        assert!(matches!(result, Err(GuardError::Io(_))));
    }
}

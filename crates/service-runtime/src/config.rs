//! # Mesh configuration
//!
//! One section per subsystem, each with process defaults that the
//! environment may override. Every tunable falls back to its default when
//! the variable is absent or unparseable; [`MeshConfig::validate`] is the
//! only gate that can refuse to start the node.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use fm_gateway::{FailurePolicy, RateLimitPolicy};
use shared_bus::{ConnectionConfig, RetryPolicy};
use shared_cache::{CacheClient, DEFAULT_TTL_SECS};
use thiserror::Error;

/// States the runtime refuses to start in.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The bus requires authentication and none was configured.
    #[error("broker credentials are unset; export FM_BUS_USERNAME and FM_BUS_PASSWORD")]
    MissingBrokerCredentials,
}

/// Complete configuration for one mesh node.
#[derive(Debug, Clone, Default)]
pub struct MeshConfig {
    pub bus: BusConfig,
    pub cache: CacheConfig,
    pub gateway: GatewayConfig,
}

impl MeshConfig {
    /// Defaults plus whatever the environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            bus: BusConfig::from_env(),
            cache: CacheConfig::from_env(),
            gateway: GatewayConfig::from_env(),
        }
    }

    /// Reject configurations the node must not run with.
    ///
    /// Missing broker credentials are the one fatal case. Everything else
    /// here has a workable default and degrades instead of aborting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.username.is_empty() || self.bus.password.is_empty() {
            return Err(ConfigError::MissingBrokerCredentials);
        }
        Ok(())
    }
}

/// Message bus settings.
///
/// The timeout fields map onto [`ConnectionConfig`]; the redelivery fields
/// shape the [`RetryPolicy`] every durable queue runs under.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Identity presented to the broker.
    pub username: String,
    /// Secret for the broker identity. Never logged.
    pub password: String,
    /// How long a connection attempt may take before it counts as failed.
    pub connect_timeout: Duration,
    /// Per-publish deadline.
    pub publish_timeout: Duration,
    /// Pause between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Delivery attempts before an event is parked on the dead letter
    /// queue. The first delivery counts as attempt 1.
    pub redelivery_attempts: u32,
    /// Backoff before the second delivery attempt.
    pub redelivery_base_delay: Duration,
    /// Upper bound any single backoff step is clamped to.
    pub redelivery_max_delay: Duration,
    /// Fraction of each backoff step to randomize, `0.0..=1.0`.
    pub redelivery_jitter: f64,
}

impl Default for BusConfig {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        let retry = RetryPolicy::default();
        Self {
            username: String::new(),
            password: String::new(),
            connect_timeout: connection.connect_timeout,
            publish_timeout: connection.publish_timeout,
            reconnect_delay: connection.reconnect_delay,
            redelivery_attempts: retry.max_attempts,
            redelivery_base_delay: retry.base_delay,
            redelivery_max_delay: retry.max_delay,
            redelivery_jitter: retry.jitter,
        }
    }
}

impl BusConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(username) = env::var("FM_BUS_USERNAME") {
            config.username = username;
        }
        if let Ok(password) = env::var("FM_BUS_PASSWORD") {
            config.password = password;
        }
        if let Some(attempts) = env_u32("FM_BUS_REDELIVERY_ATTEMPTS") {
            config.redelivery_attempts = attempts;
        }
        config
    }

    /// Connection settings in the shape the bus crate consumes.
    #[must_use]
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout,
            publish_timeout: self.publish_timeout,
            reconnect_delay: self.reconnect_delay,
        }
    }

    /// Redelivery schedule in the shape the bus crate consumes.
    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.redelivery_attempts,
            base_delay: self.redelivery_base_delay,
            max_delay: self.redelivery_max_delay,
            jitter: self.redelivery_jitter,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Per-operation deadline on every cache call.
    pub op_timeout: Duration,
    /// How often the expired-entry sweeper wakes.
    pub sweep_interval: Duration,
    /// TTL for entries written without an explicit one, such as tracking
    /// snapshots refreshed by the invalidation coordinator.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            op_timeout: CacheClient::DEFAULT_OP_TIMEOUT,
            sweep_interval: Duration::from_secs(60),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl CacheConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("FM_CACHE_TTL_SECS") {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FM_CACHE_SWEEP_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }
        config
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket the gateway accepts connections on.
    pub bind_addr: SocketAddr,
    /// Admission control applied to everything the gateway serves.
    pub rate_limit: RateLimitSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl GatewayConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = env::var("FM_GATEWAY_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.bind_addr = parsed;
            }
        }
        config.rate_limit = RateLimitSettings::from_env();
        config
    }
}

/// Fixed-window admission settings.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Window length.
    pub window: Duration,
    /// Admissions per client per window.
    pub max: u32,
    /// Whether an unreachable window store admits (`true`) or rejects
    /// (`false`).
    pub fail_open: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let policy = RateLimitPolicy::default();
        Self {
            window: policy.window,
            max: policy.max,
            fail_open: true,
        }
    }
}

impl RateLimitSettings {
    fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(window_ms) = env_u64("RATE_LIMIT_WINDOW_MS") {
            settings.window = Duration::from_millis(window_ms);
        }
        if let Some(max) = env_u32("RATE_LIMIT_MAX") {
            settings.max = max;
        }
        if let Ok(value) = env::var("FM_RATE_LIMIT_FAIL_OPEN") {
            settings.fail_open = value.to_lowercase() != "false" && value != "0";
        }
        settings
    }

    /// Admission policy in the shape the limiter consumes.
    #[must_use]
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            window: self.window,
            max: self.max,
        }
    }

    /// What the limiter does when the shared window store is unreachable.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        if self.fail_open {
            FailurePolicy::FailOpen
        } else {
            FailurePolicy::FailClosed
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

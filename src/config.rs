//! Configuration for the invocation layer
//!
//! Provides the environment-style configuration surface: per-call retry
//! parameters, per-tier admission budgets, the cache default TTL, and the
//! development/production flag gating diagnostic output.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::AdmissionPolicy;
use crate::boundary::Environment;
use crate::error::{InvokeError, Result};
use crate::executor::RetryPolicy;

/// Global configuration for the invocation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeConfig {
    /// Controls whether error responses include diagnostic fields
    pub environment: Environment,

    /// Default retry parameters for outbound calls
    pub retry: RetryConfig,

    /// Per-tier admission budgets
    pub admission: AdmissionConfig,

    /// Result cache settings
    pub cache: CacheConfig,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            retry: RetryConfig::default(),
            admission: AdmissionConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Retry parameters applied to an outbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,

    /// Delay before each retry
    pub initial_delay: Duration,

    /// Upper bound on a single attempt
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_delay, self.timeout)
    }
}

/// Client tiers; the mapping from client or endpoint to tier lives with
/// the caller, not with the admission controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Standard,
    Premium,
    Enterprise,
}

/// Window length and weighted budget for one tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierLimits {
    pub window: Duration,
    pub max_points: u32,
}

impl TierLimits {
    pub fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::new(self.window, self.max_points)
    }
}

/// Admission budgets per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub basic: TierLimits,
    pub standard: TierLimits,
    pub premium: TierLimits,
    pub enterprise: TierLimits,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        Self {
            basic: TierLimits {
                window: minute,
                max_points: 60,
            },
            standard: TierLimits {
                window: minute,
                max_points: 300,
            },
            premium: TierLimits {
                window: minute,
                max_points: 1000,
            },
            enterprise: TierLimits {
                window: minute,
                max_points: 5000,
            },
        }
    }
}

impl AdmissionConfig {
    pub fn policy_for(&self, tier: Tier) -> AdmissionPolicy {
        match tier {
            Tier::Basic => self.basic.policy(),
            Tier::Standard => self.standard.policy(),
            Tier::Premium => self.premium.policy(),
            Tier::Enterprise => self.enterprise.policy(),
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when the call site does not specify one
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
        }
    }
}

/// Configuration builder
pub struct ConfigBuilder {
    config: InvokeConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: InvokeConfig::default(),
        }
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.retry.initial_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.retry.timeout = timeout;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.default_ttl = ttl;
        self
    }

    pub fn tier_limits(mut self, tier: Tier, window: Duration, max_points: u32) -> Self {
        let limits = TierLimits { window, max_points };
        match tier {
            Tier::Basic => self.config.admission.basic = limits,
            Tier::Standard => self.config.admission.standard = limits,
            Tier::Premium => self.config.admission.premium = limits,
            Tier::Enterprise => self.config.admission.enterprise = limits,
        }
        self
    }

    pub fn build(self) -> InvokeConfig {
        self.config
    }
}

/// Load configuration from environment variables
pub fn from_env() -> InvokeConfig {
    let mut config = InvokeConfig::default();

    if let Ok(env) = std::env::var("INVOKE_ENV") {
        if env.to_lowercase() == "development" {
            config.environment = Environment::Development;
        }
    }

    if let Ok(retries) = std::env::var("INVOKE_MAX_RETRIES") {
        if let Ok(n) = retries.parse::<usize>() {
            config.retry.max_retries = n;
        }
    }

    if let Ok(delay) = std::env::var("INVOKE_INITIAL_DELAY_MS") {
        if let Ok(ms) = delay.parse::<u64>() {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
    }

    if let Ok(timeout) = std::env::var("INVOKE_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.retry.timeout = Duration::from_millis(ms);
        }
    }

    if let Ok(ttl) = std::env::var("INVOKE_CACHE_TTL_MS") {
        if let Ok(ms) = ttl.parse::<u64>() {
            config.cache.default_ttl = Duration::from_millis(ms);
        }
    }

    config
}

/// Load configuration from a TOML file
pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<InvokeConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        InvokeError::config(format!(
            "cannot read {}: {e}",
            path.as_ref().display()
        ))
    })?;
    let config: InvokeConfig = toml::from_str(&contents)
        .map_err(|e| InvokeError::config(format!("invalid configuration: {e}")))?;
    Ok(config)
}

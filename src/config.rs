// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the admission gate.
//!
//! Loaded once at process start by layering, lowest precedence first:
//! built-in defaults, an optional file named by `ADMISSION_CONFIG`, then
//! `ADMISSION__`-prefixed environment variables with `__` between sections
//! (e.g. `ADMISSION__ABUSE__BLOCK_THRESHOLD=3`).

use crate::limiter::LimiterStrategy;
use crate::policy::{Role, RoleLimitPolicy, RoleLimits};
use ::config::builder::{ConfigBuilder, DefaultState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional config file.
pub const CONFIG_FILE_ENV: &str = "ADMISSION_CONFIG";

const ENV_PREFIX: &str = "ADMISSION";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the admission gate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Per-role quotas
    #[serde(default)]
    pub roles: RolesConfig,

    /// Payload validation
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Sliding window guard
    #[serde(default)]
    pub window: WindowConfig,

    /// Limiter composition
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Abuse escalation and blocking
    #[serde(default)]
    pub abuse: AbuseConfig,

    /// Idle state eviction
    #[serde(default)]
    pub janitor: JanitorConfig,

    /// What to do when the gate itself fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Role quota table. Each role is its own key so partial overrides keep the other defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default = "default_admin_limits")]
    pub admin: RoleLimits,
    #[serde(default = "default_analyst_limits")]
    pub analyst: RoleLimits,
    #[serde(default = "default_viewer_limits")]
    pub viewer: RoleLimits,
}

/// Validation configuration for request payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum payload length in characters (default: 10)
    #[serde(default = "default_min_len")]
    pub min_len: usize,

    /// Maximum payload length in characters (default: 1000)
    #[serde(default = "default_max_len")]
    pub max_len: usize,

    /// Case-insensitive regexes that make a payload invalid
    #[serde(default = "crate::validator::default_suspicious_patterns")]
    pub suspicious_patterns: Vec<String>,

    /// Maximum characters of a payload preview written to logs (default: 200)
    #[serde(default = "default_log_preview_max_len")]
    pub log_preview_max_len: usize,
}

/// Sliding window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Maximum admissions per key per window (default: 60)
    #[serde(default = "default_window_max_requests")]
    pub max_requests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Strategies applied in order (default: token_bucket, sliding_window)
    #[serde(default = "default_strategies")]
    pub strategies: Vec<LimiterStrategy>,
}

/// Abuse escalation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseConfig {
    /// Violations that trigger a block (default: 5)
    #[serde(default = "default_block_threshold")]
    pub block_threshold: usize,

    /// Violations older than this stop counting; `null` keeps them forever (default: 86400)
    #[serde(default = "default_decay_secs")]
    pub decay_secs: Option<u64>,

    /// Stored events per IP (default: 100)
    #[serde(default = "default_max_events_per_ip")]
    pub max_events_per_ip: usize,

    /// Automatic unblock after this many seconds; `null` blocks until an admin
    /// unblocks (default: null)
    #[serde(default)]
    pub block_ttl_secs: Option<u64>,

    /// Retry-After advertised to blocked clients without a block TTL (default: 3600)
    #[serde(default = "default_blocked_retry_after_secs")]
    pub blocked_retry_after_secs: u64,
}

/// Janitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Sweep interval in seconds (default: 60)
    #[serde(default = "default_janitor_interval_secs")]
    pub interval_secs: u64,

    /// Idle time after which per-key state is evicted (default: 1800)
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

/// Behaviour when the gate cannot reach a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Reject the request
    #[default]
    FailClosed,
    /// Admit the request and log a warning
    FailOpen,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_limits() -> RoleLimits {
    RoleLimits::new(300, 50)
}

fn default_analyst_limits() -> RoleLimits {
    RoleLimits::new(120, 20)
}

fn default_viewer_limits() -> RoleLimits {
    RoleLimits::new(60, 10)
}

fn default_min_len() -> usize {
    10
}

fn default_max_len() -> usize {
    1000
}

fn default_log_preview_max_len() -> usize {
    200
}

fn default_window_secs() -> u64 {
    60
}

fn default_window_max_requests() -> u32 {
    60
}

fn default_strategies() -> Vec<LimiterStrategy> {
    vec![LimiterStrategy::TokenBucket, LimiterStrategy::SlidingWindow]
}

fn default_block_threshold() -> usize {
    5
}

fn default_decay_secs() -> Option<u64> {
    Some(24 * 60 * 60)
}

fn default_max_events_per_ip() -> usize {
    100
}

fn default_blocked_retry_after_secs() -> u64 {
    3600
}

fn default_janitor_interval_secs() -> u64 {
    60
}

fn default_idle_ttl_secs() -> u64 {
    30 * 60
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            roles: RolesConfig::default(),
            validation: ValidationConfig::default(),
            window: WindowConfig::default(),
            limiter: LimiterConfig::default(),
            abuse: AbuseConfig::default(),
            janitor: JanitorConfig::default(),
            failure_policy: FailurePolicy::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            admin: default_admin_limits(),
            analyst: default_analyst_limits(),
            viewer: default_viewer_limits(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_len: default_min_len(),
            max_len: default_max_len(),
            suspicious_patterns: crate::validator::default_suspicious_patterns(),
            log_preview_max_len: default_log_preview_max_len(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_window_max_requests(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            block_threshold: default_block_threshold(),
            decay_secs: default_decay_secs(),
            max_events_per_ip: default_max_events_per_ip(),
            block_ttl_secs: None,
            blocked_retry_after_secs: default_blocked_retry_after_secs(),
        }
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_janitor_interval_secs(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Load from the optional config file and the environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(::config::File::with_name(&path));
        }
        Self::from_builder(builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        ))
    }

    /// Parse a JSON document layered over the defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_builder(
            ::config::Config::builder()
                .add_source(::config::File::from_str(json, ::config::FileFormat::Json)),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the gate cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (role, limits) in self.roles.table() {
            if limits.requests_per_minute == 0 || limits.burst_capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "role {role} needs non-zero requests_per_minute and burst_capacity"
                )));
            }
        }
        if self.validation.min_len > self.validation.max_len {
            return Err(ConfigError::Invalid(format!(
                "validation.min_len ({}) exceeds validation.max_len ({})",
                self.validation.min_len, self.validation.max_len
            )));
        }
        if self.window.window_secs == 0 || self.window.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "window.window_secs and window.max_requests must be non-zero".to_string(),
            ));
        }
        if self.limiter.strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "limiter.strategies must name at least one strategy".to_string(),
            ));
        }
        if self.abuse.block_threshold == 0 {
            return Err(ConfigError::Invalid(
                "abuse.block_threshold must be non-zero".to_string(),
            ));
        }
        if self.abuse.max_events_per_ip < self.abuse.block_threshold {
            return Err(ConfigError::Invalid(
                "abuse.max_events_per_ip must be at least abuse.block_threshold".to_string(),
            ));
        }
        if self.janitor.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "janitor.interval_secs must be non-zero".to_string(),
            ));
        }
        if self.janitor.idle_ttl_secs < self.window.window_secs {
            return Err(ConfigError::Invalid(format!(
                "janitor.idle_ttl_secs ({}) must be at least window.window_secs ({})",
                self.janitor.idle_ttl_secs, self.window.window_secs
            )));
        }
        Ok(())
    }
}

impl RolesConfig {
    pub fn table(&self) -> HashMap<Role, RoleLimits> {
        HashMap::from([
            (Role::Admin, self.admin),
            (Role::Analyst, self.analyst),
            (Role::Viewer, self.viewer),
        ])
    }

    pub fn to_policy(&self) -> RoleLimitPolicy {
        RoleLimitPolicy::from_table(self.table())
    }
}

impl WindowConfig {
    /// Get the window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl AbuseConfig {
    pub fn decay(&self) -> Option<Duration> {
        self.decay_secs.map(Duration::from_secs)
    }

    pub fn block_ttl(&self) -> Option<Duration> {
        self.block_ttl_secs.map(Duration::from_secs)
    }
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_ok!(config.validate());
        assert_eq!(config.abuse.block_threshold, 5);
        assert_eq!(config.window.window_secs, 60);
        assert_eq!(config.janitor.idle_ttl(), Duration::from_secs(1800));
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.roles.to_policy(), RoleLimitPolicy::default());
    }

    #[test]
    fn test_json_overrides_keep_other_defaults() {
        let config = Config::from_json(
            r#"{
                "roles": { "viewer": { "requests_per_minute": 30, "burst_capacity": 5 } },
                "abuse": { "block_threshold": 3, "block_ttl_secs": 600, "decay_secs": null },
                "limiter": { "strategies": ["token_bucket"] },
                "failure_policy": "fail_open"
            }"#,
        )
        .unwrap();

        assert_eq!(config.roles.viewer, RoleLimits::new(30, 5));
        assert_eq!(config.roles.admin, RoleLimits::new(300, 50));
        assert_eq!(config.abuse.block_threshold, 3);
        assert_eq!(config.abuse.block_ttl(), Some(Duration::from_secs(600)));
        assert_eq!(config.abuse.decay(), None);
        assert_eq!(config.abuse.blocked_retry_after_secs, 3600);
        assert_eq!(config.limiter.strategies, vec![LimiterStrategy::TokenBucket]);
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.validation.max_len, 1000);
    }

    #[test]
    fn test_rejects_inverted_lengths() {
        let config = Config {
            validation: ValidationConfig {
                min_len: 50,
                max_len: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(matches!(
            Config::from_json(
                r#"{ "roles": { "admin": { "requests_per_minute": 0, "burst_capacity": 5 } } }"#
            ),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_idle_ttl_shorter_than_window() {
        let result = Config::from_json(
            r#"{ "janitor": { "idle_ttl_secs": 5 }, "window": { "max_requests": 3 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("idle_ttl_secs")));

        assert_ok!(Config::from_json(
            r#"{ "janitor": { "idle_ttl_secs": 60 }, "window": { "window_secs": 60 } }"#
        ));
    }

    #[test]
    fn test_rejects_empty_strategies() {
        assert!(matches!(
            Config::from_json(r#"{ "limiter": { "strategies": [] } }"#),
            Err(ConfigError::Invalid(_))
        ));
    }
}

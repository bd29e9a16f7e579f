// engine/src/config.rs
//
// Configuration Management Module
//
// Priority order (highest to lowest):
// 1. Command-line arguments (handled by the CLI via clap, then applied after load())
// 2. Environment variables (PLANCK__* prefix)
// 3. Config file (YAML/TOML)
// 4. Built-in defaults

use crate::policy::PolicyName;
use crate::rate_limiter::{RateLimitPolicy, MAX_PAYLOAD_BYTES};
use crate::recommender::RecommenderConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Main Configuration Structure
// ============================================================================

/// Complete engine configuration with all tunable parameters
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PlanckConfig {
    /// Backend selection policy
    pub policy: PolicyConfig,

    /// Similarity recommender
    pub recommender: RecommenderSettings,

    /// Per-client admission control
    pub rate_limit: RateLimitConfig,

    /// History store access
    pub history: HistoryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Policy Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Policy applied when a request names none.
    ///
    /// Kept as free text: unrecognised values fall back to `latency_first`
    /// with a warning rather than failing startup.
    pub default_policy: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_policy: PolicyName::LatencyFirst.as_str().to_string(),
        }
    }
}

// ============================================================================
// Recommender Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecommenderSettings {
    /// Minimum cosine similarity for a past execution to vote
    pub similarity_threshold: f64,

    /// Maximum number of voting executions
    pub max_candidates: usize,

    /// Shot-count bucket width used in voting
    pub shot_bucket: u32,

    /// History similarity query deadline (milliseconds)
    pub query_timeout_ms: u64,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            max_candidates: 80,
            shot_bucket: 100,
            query_timeout_ms: 2_000,
        }
    }
}

// ============================================================================
// Rate Limiting Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Tokens a bucket can hold
    pub bucket_capacity: u32,

    /// One token is added per interval (milliseconds)
    pub refill_interval_ms: u64,

    /// Buckets idle for this many refill intervals are reaped
    pub idle_multiplier: u32,

    /// How often the sweeper runs (seconds)
    pub sweep_interval_secs: u64,

    /// Largest accepted serialized payload (bytes)
    pub max_payload_bytes: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: 1,
            refill_interval_ms: 3_000,
            idle_multiplier: 10,
            sweep_interval_secs: 30,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

// ============================================================================
// History Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// Deadline for appending an execution record (milliseconds)
    pub append_timeout_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            append_timeout_ms: 2_000,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: LogLevel,

    /// Log format (json or text)
    pub format: LogFormat,

    /// Log to file (path, or None for stdout only)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format (for log aggregation)
    Json,
}

// ============================================================================
// Configuration Loading
// ============================================================================

impl PlanckConfig {
    /// Load configuration with priority chain:
    /// 1. Environment variables (PLANCK__*)
    /// 2. Config file (if provided)
    /// 3. Built-in defaults
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let defaults = Self::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize defaults")?;
        builder = builder.add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PLANCK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build().context("Failed to build config")?;

        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize config")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let threshold = self.recommender.similarity_threshold;
        anyhow::ensure!(
            threshold.is_finite() && (0.0..=1.0).contains(&threshold),
            "similarity_threshold must be a finite value in [0.0, 1.0], got {}",
            threshold
        );
        anyhow::ensure!(
            self.recommender.max_candidates > 0,
            "max_candidates must be > 0, got {}",
            self.recommender.max_candidates
        );
        anyhow::ensure!(
            self.recommender.shot_bucket > 0,
            "shot_bucket must be > 0, got {}",
            self.recommender.shot_bucket
        );
        anyhow::ensure!(
            self.recommender.query_timeout_ms > 0,
            "query_timeout_ms must be > 0, got {}",
            self.recommender.query_timeout_ms
        );

        anyhow::ensure!(
            self.rate_limit.bucket_capacity > 0,
            "bucket_capacity must be > 0, got {}",
            self.rate_limit.bucket_capacity
        );
        anyhow::ensure!(
            self.rate_limit.refill_interval_ms > 0,
            "refill_interval_ms must be > 0, got {}",
            self.rate_limit.refill_interval_ms
        );
        anyhow::ensure!(
            self.rate_limit.idle_multiplier > 0,
            "idle_multiplier must be > 0, got {}",
            self.rate_limit.idle_multiplier
        );
        anyhow::ensure!(
            self.rate_limit.sweep_interval_secs > 0,
            "sweep_interval_secs must be > 0, got {}",
            self.rate_limit.sweep_interval_secs
        );
        anyhow::ensure!(
            self.rate_limit.max_payload_bytes > 0,
            "max_payload_bytes must be > 0, got {}",
            self.rate_limit.max_payload_bytes
        );

        anyhow::ensure!(
            self.history.append_timeout_ms > 0,
            "append_timeout_ms must be > 0, got {}",
            self.history.append_timeout_ms
        );

        Ok(())
    }

    /// Resolved default policy; unrecognised names warn and become `latency_first`.
    pub fn default_policy(&self) -> PolicyName {
        PolicyName::parse_or_default(&self.policy.default_policy)
    }

    pub fn recommender_config(&self) -> RecommenderConfig {
        RecommenderConfig {
            similarity_threshold: self.recommender.similarity_threshold,
            max_candidates: self.recommender.max_candidates,
            shot_bucket: self.recommender.shot_bucket,
            query_timeout: Duration::from_millis(self.recommender.query_timeout_ms),
        }
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        let refill_interval = Duration::from_millis(self.rate_limit.refill_interval_ms);
        RateLimitPolicy {
            capacity: self.rate_limit.bucket_capacity,
            refill_interval,
            idle_ttl: refill_interval.saturating_mul(self.rate_limit.idle_multiplier),
        }
    }

    /// Get history append deadline as Duration
    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.history.append_timeout_ms)
    }

    /// Get sweeper period as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.sweep_interval_secs)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Generate YAML config with default values.
///
/// # Example
/// ```bash
/// planck_cli --generate-config yaml > planck.yaml
/// ```
pub fn generate_example_yaml() -> String {
    let config = PlanckConfig::default();
    match serde_yaml::to_string(&config) {
        Ok(serialized) => serialized,
        Err(error) => format!("# failed to serialize default config to YAML: {error}\n"),
    }
}

/// Generate TOML config with default values.
pub fn generate_example_toml() -> String {
    let config = PlanckConfig::default();
    match toml::to_string_pretty(&config) {
        Ok(serialized) => serialized,
        Err(error) => format!("# failed to serialize default config to TOML: {error}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLICY_ENV: &str = "PLANCK__POLICY__DEFAULT_POLICY";

    // Serialises tests that call `load()`: environment variables are process-wide
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    /// Sets an env var for the lifetime of the guard
    struct EnvVarGuard(&'static str);

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            std::env::set_var(key, value);
            Self(key)
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            std::env::remove_var(self.0);
        }
    }

    #[test]
    fn test_default_config_validates() {
        let config = PlanckConfig::default();
        config.validate().expect("Default config should be valid");
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PlanckConfig::default();
        assert_eq!(config.default_policy(), PolicyName::LatencyFirst);
        assert_eq!(config.recommender_config(), RecommenderConfig::default());
        assert_eq!(config.rate_limit_policy(), RateLimitPolicy::default());
        assert_eq!(config.append_timeout(), Duration::from_millis(2_000));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.rate_limit.max_payload_bytes, 1_048_576);
    }

    #[test]
    fn test_idle_ttl_is_multiple_of_refill_interval() {
        let mut config = PlanckConfig::default();
        config.rate_limit.refill_interval_ms = 500;
        config.rate_limit.idle_multiplier = 4;
        assert_eq!(config.rate_limit_policy().idle_ttl, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = PlanckConfig::default();
        config.recommender.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        config.recommender.similarity_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = PlanckConfig::default();
        config.recommender.max_candidates = 0;
        assert!(config.validate().is_err());

        let mut config = PlanckConfig::default();
        config.rate_limit.refill_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = PlanckConfig::default();
        config.rate_limit.max_payload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_policy_falls_back() {
        let mut config = PlanckConfig::default();
        config.policy.default_policy = "fastest_please".to_string();
        config.validate().expect("unknown policy names are not fatal");
        assert_eq!(config.default_policy(), PolicyName::LatencyFirst);
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Info.as_str(), "info");
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn test_load_from_yaml_file() {
        let _lock = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "policy:\n  default_policy: cost_first\nrecommender:\n  max_candidates: 20\n"
        )
        .unwrap();

        let config = PlanckConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.default_policy(), PolicyName::CostFirst);
        assert_eq!(config.recommender.max_candidates, 20);
        // Untouched sections keep defaults
        assert_eq!(config.rate_limit.refill_interval_ms, 3_000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let _lock = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[recommender]\nmax_candidate = 20\n").unwrap();

        assert!(PlanckConfig::load(file.path().to_str()).is_err());
    }

    #[test]
    fn test_generated_examples_parse_back() {
        let yaml: PlanckConfig = serde_yaml::from_str(&generate_example_yaml()).unwrap();
        yaml.validate().unwrap();

        let toml_cfg: PlanckConfig = toml::from_str(&generate_example_toml()).unwrap();
        assert_eq!(toml_cfg.rate_limit.bucket_capacity, 1);
    }

    #[test]
    fn test_env_selects_default_policy() {
        let _lock = ENV_LOCK.lock();
        let _env = EnvVarGuard::set(POLICY_ENV, "cost_first");

        let config = PlanckConfig::load(None).unwrap();
        assert_eq!(config.policy.default_policy, "cost_first");
        assert_eq!(config.default_policy(), PolicyName::CostFirst);
    }

    #[test]
    fn test_env_overrides_file_policy() {
        let _lock = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "policy:\n  default_policy: cost_first\n").unwrap();
        let _env = EnvVarGuard::set(POLICY_ENV, "capacity_first");

        let config = PlanckConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.default_policy(), PolicyName::CapacityFirst);
    }

    #[test]
    fn test_unrecognised_env_policy_falls_back_to_latency_first() {
        let _lock = ENV_LOCK.lock();
        let _env = EnvVarGuard::set(POLICY_ENV, "fastest_please");

        let config = PlanckConfig::load(None).expect("unknown policy names are not fatal");
        assert_eq!(config.default_policy(), PolicyName::LatencyFirst);
    }
}

// crates/dcal-config/src/config.rs
// ============================================================================
// Module: DCAL Configuration
// Description: Configuration loading and validation for DCAL.
// Purpose: Provide strict, fail-closed config parsing with hard limits, and
//          conversion into the runtime types `dcal-core` accepts.
// Dependencies: dcal-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path
//! limits. Missing or invalid configuration fails closed: a partially
//! valid config is never accepted.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use dcal_core::BreakerConfig;
use dcal_core::Priority;
use dcal_core::ReviewQueue;
use dcal_core::SynthesisThresholds;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "dcal.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "DCAL_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Top-level DCAL configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DcalConfig {
    /// Decision synthesis thresholds (§4.5).
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    /// Queue SLA mode and overrides (§4.6).
    #[serde(default)]
    pub sla: SlaConfig,
    /// Per-dependency circuit breaker tuning (§4.8).
    #[serde(default)]
    pub breaker: BreakerSettingsConfig,
    /// Degradation manager thresholds (§4.8).
    #[serde(default)]
    pub degradation: DegradationConfig,
    /// Ingestion layer rate limiting and idempotency (§4.9).
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Result publisher outbox and backoff (§4.10).
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Audit store connection settings (§4.7).
    #[serde(default)]
    pub audit: AuditStoreConfig,
    /// Paths to signing-key material; values themselves are resolved from
    /// the environment, never accepted here.
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl Default for DcalConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdsConfig::default(),
            sla: SlaConfig::default(),
            breaker: BreakerSettingsConfig::default(),
            degradation: DegradationConfig::default(),
            ingestion: IngestionConfig::default(),
            publisher: PublisherConfig::default(),
            audit: AuditStoreConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

impl DcalConfig {
    /// Loads configuration from disk using the default resolution rules
    /// (`path`, then `DCAL_CONFIG`, then `./dcal.toml`).
    ///
    /// # Errors
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content =
            std::str::from_utf8(&bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.sla.validate()?;
        self.breaker.validate()?;
        self.degradation.validate()?;
        self.ingestion.validate()?;
        self.publisher.validate()?;
        self.audit.validate()?;
        self.secrets.validate()?;
        Ok(())
    }
}

/// Decision synthesis thresholds, mirroring [`SynthesisThresholds`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThresholdsConfig {
    /// See [`SynthesisThresholds::high_risk_threshold`].
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,
    /// See [`SynthesisThresholds::medium_risk_threshold`].
    #[serde(default = "default_medium_risk_threshold")]
    pub medium_risk_threshold: f64,
    /// See [`SynthesisThresholds::auto_approve_ml_threshold`].
    #[serde(default = "default_auto_approve_ml_threshold")]
    pub auto_approve_ml_threshold: f64,
    /// See [`SynthesisThresholds::min_confidence_for_auto`].
    #[serde(default = "default_min_confidence_for_auto")]
    pub min_confidence_for_auto: f64,
    /// See [`SynthesisThresholds::auto_approve_max_amount`].
    #[serde(default = "default_auto_approve_max_amount")]
    pub auto_approve_max_amount: f64,
    /// See [`SynthesisThresholds::senior_review_amount_threshold`].
    #[serde(default = "default_senior_review_amount_threshold")]
    pub senior_review_amount_threshold: f64,
    /// See [`SynthesisThresholds::medical_director_amount_threshold`].
    #[serde(default = "default_medical_director_amount_threshold")]
    pub medical_director_amount_threshold: f64,
    /// See [`SynthesisThresholds::related_claims_top_n`].
    #[serde(default = "default_related_claims_top_n")]
    pub related_claims_top_n: usize,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: default_high_risk_threshold(),
            medium_risk_threshold: default_medium_risk_threshold(),
            auto_approve_ml_threshold: default_auto_approve_ml_threshold(),
            min_confidence_for_auto: default_min_confidence_for_auto(),
            auto_approve_max_amount: default_auto_approve_max_amount(),
            senior_review_amount_threshold: default_senior_review_amount_threshold(),
            medical_director_amount_threshold: default_medical_director_amount_threshold(),
            related_claims_top_n: default_related_claims_top_n(),
        }
    }
}

impl ThresholdsConfig {
    /// Converts this config section into the runtime threshold type.
    #[must_use]
    pub const fn to_synthesis_thresholds(self) -> SynthesisThresholds {
        SynthesisThresholds {
            high_risk_threshold: self.high_risk_threshold,
            medium_risk_threshold: self.medium_risk_threshold,
            auto_approve_ml_threshold: self.auto_approve_ml_threshold,
            min_confidence_for_auto: self.min_confidence_for_auto,
            auto_approve_max_amount: self.auto_approve_max_amount,
            senior_review_amount_threshold: self.senior_review_amount_threshold,
            medical_director_amount_threshold: self.medical_director_amount_threshold,
            related_claims_top_n: self.related_claims_top_n,
        }
    }

    /// Validates that every threshold lies in `[0, 1]` and amount
    /// guardrails are non-negative.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a threshold is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("thresholds.high_risk_threshold", self.high_risk_threshold),
            ("thresholds.medium_risk_threshold", self.medium_risk_threshold),
            ("thresholds.auto_approve_ml_threshold", self.auto_approve_ml_threshold),
            ("thresholds.min_confidence_for_auto", self.min_confidence_for_auto),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be between 0.0 and 1.0")));
            }
        }
        if self.auto_approve_max_amount < 0.0 {
            return Err(ConfigError::Invalid("thresholds.auto_approve_max_amount must be non-negative".to_string()));
        }
        if self.related_claims_top_n == 0 {
            return Err(ConfigError::Invalid("thresholds.related_claims_top_n must be at least 1".to_string()));
        }
        Ok(())
    }
}

const fn default_high_risk_threshold() -> f64 {
    0.70
}
const fn default_medium_risk_threshold() -> f64 {
    0.50
}
const fn default_auto_approve_ml_threshold() -> f64 {
    0.30
}
const fn default_min_confidence_for_auto() -> f64 {
    0.85
}
const fn default_auto_approve_max_amount() -> f64 {
    10_000.0
}
const fn default_senior_review_amount_threshold() -> f64 {
    50_000.0
}
const fn default_medical_director_amount_threshold() -> f64 {
    50_000.0
}
const fn default_related_claims_top_n() -> usize {
    5
}

/// SLA accounting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaMode {
    /// SLA deadlines are measured in continuous wall-clock hours.
    #[default]
    WallClock,
    /// SLA deadlines are measured in business hours only.
    BusinessHours,
}

/// One SLA override entry, overriding the built-in `(priority, queue)`
/// default table.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SlaOverrideEntry {
    /// The priority this override applies to.
    pub priority: Priority,
    /// The queue this override applies to.
    pub queue: ReviewQueue,
    /// The overriding SLA, in hours.
    pub hours: u32,
}

/// Queue SLA configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlaConfig {
    /// Accounting mode.
    #[serde(default)]
    pub mode: SlaMode,
    /// Overrides to the built-in default table.
    #[serde(default)]
    pub overrides: Vec<SlaOverrideEntry>,
}

impl SlaConfig {
    /// Builds the override lookup table `sla_hours` consults.
    #[must_use]
    pub fn to_overrides_map(&self) -> BTreeMap<(Priority, ReviewQueue), u32> {
        self.overrides.iter().map(|entry| ((entry.priority, entry.queue), entry.hours)).collect()
    }

    /// Validates that every override's hours value is nonzero.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when an override has zero hours.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overrides.iter().any(|entry| entry.hours == 0) {
            return Err(ConfigError::Invalid("sla.overrides entries must have hours > 0".to_string()));
        }
        Ok(())
    }
}

/// Circuit breaker tuning for the audit store and result publisher
/// dependencies.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BreakerSettingsConfig {
    /// Breaker tuning guarding `AuditSink` calls.
    #[serde(default)]
    pub audit: SingleBreakerConfig,
    /// Breaker tuning guarding `ReportPublisher` calls.
    #[serde(default)]
    pub publish: SingleBreakerConfig,
}

impl Default for BreakerSettingsConfig {
    fn default() -> Self {
        Self { audit: SingleBreakerConfig::default(), publish: SingleBreakerConfig::default() }
    }
}

impl BreakerSettingsConfig {
    /// Validates both breaker sections.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when either section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audit.validate("breaker.audit")?;
        self.publish.validate("breaker.publish")?;
        Ok(())
    }
}

/// One dependency's circuit breaker tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SingleBreakerConfig {
    /// Consecutive failures that trip CLOSED -> OPEN.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long OPEN holds before probing HALF_OPEN, in milliseconds.
    #[serde(default = "default_breaker_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum concurrent probe calls allowed in HALF_OPEN.
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
    /// Consecutive probe successes required to close the breaker.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for SingleBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_ms: default_breaker_timeout_ms(),
            half_open_max_calls: default_half_open_max_calls(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl SingleBreakerConfig {
    /// Converts this config section into the runtime breaker config.
    #[must_use]
    pub const fn to_breaker_config(self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_millis(self.timeout_ms),
            half_open_max_calls: self.half_open_max_calls,
            success_threshold: self.success_threshold,
        }
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(format!("{section}.failure_threshold must be at least 1")));
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::Invalid(format!("{section}.half_open_max_calls must be at least 1")));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::Invalid(format!("{section}.success_threshold must be at least 1")));
        }
        Ok(())
    }
}

const fn default_failure_threshold() -> u32 {
    5
}
const fn default_breaker_timeout_ms() -> u64 {
    30_000
}
const fn default_half_open_max_calls() -> u32 {
    3
}
const fn default_success_threshold() -> u32 {
    3
}

/// Degradation manager thresholds (§4.8).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DegradationConfig {
    /// How often the degradation manager re-evaluates health, in
    /// milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// CPU or memory utilization, in `[0, 1]`, above which L2 High-load
    /// applies.
    #[serde(default = "default_high_load_utilization_threshold")]
    pub high_load_utilization_threshold: f64,
    /// Ingest queue depth above which L2 High-load applies.
    #[serde(default = "default_ingest_queue_depth_threshold")]
    pub ingest_queue_depth_threshold: u64,
    /// Rolling error rate, in `[0, 1]`, above which L3 Rules-only applies.
    #[serde(default = "default_rules_only_error_rate_threshold")]
    pub rules_only_error_rate_threshold: f64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            high_load_utilization_threshold: default_high_load_utilization_threshold(),
            ingest_queue_depth_threshold: default_ingest_queue_depth_threshold(),
            rules_only_error_rate_threshold: default_rules_only_error_rate_threshold(),
        }
    }
}

impl DegradationConfig {
    /// Validates that utilization/rate fields lie in `[0, 1]`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a fraction is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("degradation.high_load_utilization_threshold", self.high_load_utilization_threshold),
            ("degradation.rules_only_error_rate_threshold", self.rules_only_error_rate_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be between 0.0 and 1.0")));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("degradation.poll_interval_ms must be at least 1".to_string()));
        }
        Ok(())
    }
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}
const fn default_high_load_utilization_threshold() -> f64 {
    0.90
}
const fn default_ingest_queue_depth_threshold() -> u64 {
    10_000
}
const fn default_rules_only_error_rate_threshold() -> f64 {
    0.10
}

/// Ingestion layer settings (§4.9): rate limiting, clock-skew tolerance,
/// and idempotency cache sizing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngestionConfig {
    /// Maximum sustained requests per second.
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,
    /// Token bucket burst capacity.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
    /// Maximum allowed clock skew between envelope timestamp and receipt
    /// time, in seconds.
    #[serde(default = "default_max_clock_skew_seconds")]
    pub max_clock_skew_seconds: u64,
    /// Maximum tracked idempotency keys in the dedupe cache.
    #[serde(default = "default_idempotency_cache_size")]
    pub idempotency_cache_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_burst: default_rate_limit_burst(),
            max_clock_skew_seconds: default_max_clock_skew_seconds(),
            idempotency_cache_size: default_idempotency_cache_size(),
        }
    }
}

impl IngestionConfig {
    /// Validates that rate and cache settings are nonzero.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_per_second == 0 {
            return Err(ConfigError::Invalid("ingestion.rate_limit_per_second must be at least 1".to_string()));
        }
        if self.rate_limit_burst == 0 {
            return Err(ConfigError::Invalid("ingestion.rate_limit_burst must be at least 1".to_string()));
        }
        if self.idempotency_cache_size == 0 {
            return Err(ConfigError::Invalid("ingestion.idempotency_cache_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

const fn default_rate_limit_per_second() -> u32 {
    1_000
}
const fn default_rate_limit_burst() -> u32 {
    5_000
}
const fn default_max_clock_skew_seconds() -> u64 {
    600
}
const fn default_idempotency_cache_size() -> usize {
    1_000_000
}

/// Result publisher settings (§4.10): outbox location, retry backoff, and
/// in-memory buffer sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// Filesystem path for the durable outbox.
    #[serde(default = "default_outbox_path")]
    pub outbox_path: String,
    /// Retry backoff schedule, in milliseconds, applied in order and then
    /// held at the last value.
    #[serde(default = "default_backoff_schedule_ms")]
    pub backoff_schedule_ms: Vec<u64>,
    /// Maximum in-flight publish buffer size before backpressure applies.
    #[serde(default = "default_publish_buffer_size")]
    pub buffer_size: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            outbox_path: default_outbox_path(),
            backoff_schedule_ms: default_backoff_schedule_ms(),
            buffer_size: default_publish_buffer_size(),
        }
    }
}

impl PublisherConfig {
    /// Validates the outbox path and backoff schedule are non-empty.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when either is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("publisher.outbox_path", &self.outbox_path)?;
        if self.backoff_schedule_ms.is_empty() {
            return Err(ConfigError::Invalid("publisher.backoff_schedule_ms must not be empty".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("publisher.buffer_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn default_outbox_path() -> String {
    "dcal-outbox.db".to_string()
}
fn default_backoff_schedule_ms() -> Vec<u64> {
    vec![1_000, 5_000, 30_000, 60_000]
}
const fn default_publish_buffer_size() -> usize {
    1_024
}

/// Audit store connection settings (§4.7).
#[derive(Debug, Clone, Deserialize)]
pub struct AuditStoreConfig {
    /// Filesystem path to the `SQLite` audit database.
    #[serde(default = "default_audit_path")]
    pub path: String,
    /// `SQLite` busy-wait timeout, in milliseconds.
    #[serde(default = "default_audit_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for AuditStoreConfig {
    fn default() -> Self {
        Self { path: default_audit_path(), busy_timeout_ms: default_audit_busy_timeout_ms() }
    }
}

impl AuditStoreConfig {
    /// Validates the configured path is non-empty and within length
    /// limits.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the path is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("audit.path", &self.path)
    }
}

fn default_audit_path() -> String {
    "dcal-audit.db".to_string()
}
const fn default_audit_busy_timeout_ms() -> u64 {
    5_000
}

/// Paths to signing-key material. Key bytes themselves are never embedded
/// in configuration; they are read from the path (or an injected secrets
/// provider) at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsConfig {
    /// Path to the HMAC signing key used to verify inbound claim
    /// envelopes (§4.9/§6).
    #[serde(default)]
    pub hmac_key_path: Option<String>,
}

impl SecretsConfig {
    /// Validates that a configured path is non-empty.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a configured path is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.hmac_key_path {
            validate_path_string("secrets.hmac_key_path", path)?;
        }
        Ok(())
    }
}

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Resolves the config path from CLI, environment, or default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    Ok(())
}

/// Validates a path-like config string against length and emptiness
/// constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = DcalConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = DcalConfig::default();
        config.thresholds.high_risk_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_backoff_schedule_is_rejected() {
        let mut config = DcalConfig::default();
        config.publisher.backoff_schedule_ms.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn sla_override_table_round_trips() {
        let toml_src = r#"
            [[sla.overrides]]
            priority = "CRITICAL"
            queue = "FRAUD_INVESTIGATION"
            hours = 2
        "#;
        let config: DcalConfig = toml::from_str(toml_src).expect("parses");
        let overrides = config.sla.to_overrides_map();
        assert_eq!(overrides.get(&(Priority::Critical, ReviewQueue::FraudInvestigation)), Some(&2));
    }

    #[test]
    fn load_rejects_oversized_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dcal.toml");
        let oversized = "a".repeat(MAX_CONFIG_FILE_SIZE + 1);
        fs::write(&path, format!("# {oversized}")).expect("write");
        let err = DcalConfig::load(Some(&path)).expect_err("should reject oversized config");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}

// crates/dcal-cli/src/main.rs
// ============================================================================
// Module: DCAL Process Entry Point
// Description: Wires the configured backends into a ClaimPipeline and
//              exposes the operator-facing command surface.
// Purpose: `serve` runs the ingestion consumer against a running pipeline;
//          `verify-audit`, `replay-outbox`, and `reload-rules` are
//          point-in-time operator commands (§6).
// Dependencies: dcal-core, dcal-config, dcal-broker, dcal-store-sqlite,
//               clap, tokio
// ============================================================================

//! ## Overview
//! Exit codes follow §6/§7: `0` normal shutdown, `1` fatal configuration,
//! `2` rule-integrity failure at startup, `3` audit-integrity failure at
//! startup. Every other runtime failure is logged to the operational
//! journal rather than propagated, consistent with the pipeline's own
//! fail-closed-but-never-panic posture.

mod ml_engine;
mod rules;

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use dcal_broker::FileSink;
use dcal_broker::FileSource;
use dcal_broker::IngestionConsumer;
use dcal_broker::IngestionSettings;
use dcal_broker::OutboxPublisher;
use dcal_broker::RateLimitConfig;
use dcal_core::AuditSink as _;
use dcal_core::ClaimPipeline;
use dcal_core::FileJournal;
use dcal_core::PipelineBudgets;
use dcal_core::PipelineConfig;
use dcal_core::ReportPublisher as _;
use dcal_core::RuleStore;
use dcal_core::runtime::degradation::HealthSnapshot;
use dcal_core::runtime::degradation::select_level;
use dcal_store_sqlite::SqliteAuditStore;
use dcal_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

/// Environment variable carrying the hex-encoded HMAC signing key.
const SIGNING_KEY_ENV_VAR: &str = "DCAL_HMAC_SIGNING_KEY_HEX";
/// Environment variable carrying the `file://` broker endpoint for `serve`.
const BROKER_ENDPOINT_ENV_VAR: &str = "DCAL_BROKER_ENDPOINT";
/// Environment variable carrying the rule bundle path.
const RULE_BUNDLE_ENV_VAR: &str = "DCAL_RULE_BUNDLE_PATH";
/// Default rule bundle path when the environment variable is unset.
const DEFAULT_RULE_BUNDLE_PATH: &str = "rules.json";
/// Default broker endpoint when the environment variable is unset.
const DEFAULT_BROKER_ENDPOINT: &str = "file://./claims.ndjson";
/// Default operational journal path.
const DEFAULT_JOURNAL_PATH: &str = "dcal-journal.ndjson";

/// Top-level command-line arguments.
#[derive(Parser)]
#[command(name = "dcal", about = "Dynamic Claims Automation Layer")]
struct Cli {
    /// Path to `dcal.toml`; falls back to `DCAL_CONFIG`, then `./dcal.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the ingestion consumer against the configured pipeline until
    /// interrupted.
    Serve,
    /// Verifies the audit chain between two sequence numbers, inclusive.
    VerifyAudit {
        /// First sequence number to verify.
        #[arg(long)]
        from: u64,
        /// Last sequence number to verify.
        #[arg(long)]
        to: u64,
    },
    /// Replays everything currently parked in the result publisher's
    /// durable outbox.
    ReplayOutbox,
    /// Reloads the rule store from a freshly verified bundle on disk.
    ReloadRules {
        /// Path to the rule bundle; defaults to `DCAL_RULE_BUNDLE_PATH` or
        /// `rules.json`.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Errors surfaced to `main`, each carrying the exit code it maps to.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded or is invalid (exit code 1).
    #[error("{0}")]
    Config(String),
    /// The rule bundle failed integrity verification at startup (exit
    /// code 2).
    #[error("{0}")]
    RuleIntegrity(String),
    /// The audit store failed a readiness or verification check at
    /// startup (exit code 3).
    #[error("{0}")]
    AuditIntegrity(String),
    /// Any other operator-command failure (exit code 1).
    #[error("{0}")]
    Command(String),
}

impl CliError {
    /// The process exit code this error maps to.
    const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 1,
            Self::RuleIntegrity(_) => 2,
            Self::AuditIntegrity(_) => 3,
            Self::Command(_) => 1,
        }
    }
}

/// Shorthand for a result that fails with [`CliError`].
type CliResult<T> = Result<T, CliError>;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => emit_error(&err),
    }
}

/// Parses arguments, loads configuration, and dispatches to the selected
/// subcommand.
async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = dcal_config::DcalConfig::load(cli.config.as_deref()).map_err(|err| CliError::Config(err.to_string()))?;

    match cli.command {
        Commands::Serve => serve(&config).await,
        Commands::VerifyAudit { from, to } => verify_audit(&config, from, to),
        Commands::ReplayOutbox => replay_outbox(&config),
        Commands::ReloadRules { path } => reload_rules(&config, path.as_deref()),
    }
}

/// Writes an error to stderr and maps it to the process exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "{err}");
    ExitCode::from(err.exit_code())
}

/// Reads the HMAC signing key, required before any envelope can be
/// admitted. The key is never accepted as a CLI argument or logged.
///
/// # Errors
/// Returns [`CliError::Config`] when neither the hex environment variable
/// nor the configured key file is present and readable.
fn load_signing_key(config: &dcal_config::DcalConfig) -> CliResult<Vec<u8>> {
    if let Ok(hex_key) = std::env::var(SIGNING_KEY_ENV_VAR) {
        return decode_hex(&hex_key).map_err(|err| CliError::Config(format!("invalid {SIGNING_KEY_ENV_VAR}: {err}")));
    }
    let Some(path) = &config.secrets.hmac_key_path else {
        return Err(CliError::Config(format!(
            "no signing key configured: set {SIGNING_KEY_ENV_VAR} or secrets.hmac_key_path"
        )));
    };
    std::fs::read(path).map_err(|err| CliError::Config(format!("failed to read signing key at {path}: {err}")))
}

/// Decodes an even-length hex string into raw bytes.
fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    let trimmed = text.trim();
    if trimmed.len() % 2 != 0 {
        return Err("hex string must have an even number of digits".to_string());
    }
    (0 .. trimmed.len())
        .step_by(2)
        .map(|idx| u8::from_str_radix(&trimmed[idx .. idx + 2], 16).map_err(|err| err.to_string()))
        .collect()
}

/// Opens the configured SQLite audit store.
fn open_audit_store(config: &dcal_config::DcalConfig) -> CliResult<SqliteAuditStore> {
    let store_config = SqliteStoreConfig { path: PathBuf::from(&config.audit.path), busy_timeout_ms: config.audit.busy_timeout_ms };
    SqliteAuditStore::open(&store_config).map_err(|err| CliError::AuditIntegrity(err.to_string()))
}

/// Loads and verifies a rule bundle, wrapping it in a fresh [`RuleStore`].
fn load_verified_rule_store(path: &Path) -> CliResult<RuleStore> {
    let snapshot = rules::load_rule_snapshot(path).map_err(|err| CliError::RuleIntegrity(err.to_string()))?;
    Ok(RuleStore::new(snapshot))
}

/// Assembles a [`PipelineConfig`] from the individual configuration
/// sections; `engine_version`, `queue_capacities`, `ml_weights`, and
/// `ml_top_n` have no TOML-exposed knobs yet and keep their defaults.
fn build_pipeline_config(config: &dcal_config::DcalConfig) -> PipelineConfig {
    PipelineConfig {
        budgets: PipelineBudgets::default(),
        audit_breaker: config.breaker.audit.to_breaker_config(),
        publish_breaker: config.breaker.publish.to_breaker_config(),
        thresholds: config.thresholds.to_synthesis_thresholds(),
        sla_overrides: config.sla.to_overrides_map(),
        ..PipelineConfig::default()
    }
}

/// Resolves the rule bundle path from a CLI override, then the environment
/// variable, then the default filename.
fn rule_bundle_path(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    std::env::var(RULE_BUNDLE_ENV_VAR).map_or_else(|_| PathBuf::from(DEFAULT_RULE_BUNDLE_PATH), PathBuf::from)
}

/// The concrete pipeline type `serve` wires together.
type Pipeline = ClaimPipeline<SqliteAuditStore, ml_engine::ParallelMlEngine, OutboxPublisher<FileSink>, Arc<dcal_core::FileJournal>>;

/// Runs the ingestion consumer against a freshly assembled pipeline until
/// interrupted, with a second thread periodically re-evaluating the
/// degradation level.
async fn serve(config: &dcal_config::DcalConfig) -> CliResult<()> {
    let signing_key = load_signing_key(config)?;
    let audit = open_audit_store(config)?;
    audit.readiness().map_err(|err| CliError::AuditIntegrity(err.to_string()))?;

    let rule_store = load_verified_rule_store(&rule_bundle_path(None))?;

    let sink = FileSink::open(&sink_path(config)).map_err(|err| CliError::Config(err.to_string()))?;
    let publisher = OutboxPublisher::new(sink, &config.publisher.backoff_schedule_ms, config.publisher.buffer_size, PathBuf::from(&config.publisher.outbox_path));

    let journal = Arc::new(FileJournal::open(Path::new(DEFAULT_JOURNAL_PATH)).map_err(|err| CliError::Config(err.to_string()))?);

    let pipeline_config = build_pipeline_config(config);
    let ml_engine =
        ml_engine::ParallelMlEngine::new(Vec::new(), pipeline_config.ml_weights.clone(), pipeline_config.ml_top_n, Duration::from_millis(500));

    let pipeline: Arc<Pipeline> =
        Arc::new(ClaimPipeline::new(rule_store, audit, ml_engine, publisher, Arc::clone(&journal), pipeline_config));

    let endpoint = std::env::var(BROKER_ENDPOINT_ENV_VAR).unwrap_or_else(|_| DEFAULT_BROKER_ENDPOINT.to_string());
    let source = FileSource::open(&endpoint).map_err(|err| CliError::Config(err.to_string()))?;

    let settings = IngestionSettings {
        rate_limit: RateLimitConfig { rate_per_second: config.ingestion.rate_limit_per_second, burst: config.ingestion.rate_limit_burst },
        idempotency_capacity: config.ingestion.idempotency_cache_size,
        signing_key,
        max_skew_seconds: config.ingestion.max_clock_skew_seconds,
        max_messages_per_poll: 100,
    };
    let consumer = Arc::new(IngestionConsumer::new(source, Arc::clone(&pipeline), Arc::clone(&journal), settings));

    let shutdown = Arc::new(AtomicBool::new(false));
    let poll_interval = Duration::from_millis(config.degradation.poll_interval_ms);
    let queue_depth_threshold = config.degradation.ingest_queue_depth_threshold;

    let ingest_handle = {
        let consumer = Arc::clone(&consumer);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match consumer.run_once() {
                    Ok(0) => std::thread::sleep(Duration::from_millis(50)),
                    Ok(_) => {}
                    Err(_) => std::thread::sleep(Duration::from_millis(500)),
                }
            }
        })
    };

    let health_handle = {
        let consumer = Arc::clone(&consumer);
        let pipeline = Arc::clone(&pipeline);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(poll_interval);
                let stats = consumer.stats();
                let failures = stats.signature_failures + stats.schema_failures + stats.replay_violations;
                let total = stats.admitted + failures;
                #[allow(clippy::cast_precision_loss, reason = "error rate is an approximation, not an exact count")]
                let error_rate = if total == 0 { 0.0 } else { failures as f64 / total as f64 };
                let snapshot = HealthSnapshot {
                    error_rate,
                    ingest_queue_depth_threshold: queue_depth_threshold,
                    ..HealthSnapshot::default()
                };
                pipeline.degradation().update(select_level(&snapshot));
            }
        })
    };

    let _ = tokio::signal::ctrl_c().await;
    shutdown.store(true, Ordering::Relaxed);
    let _ = ingest_handle.join();
    let _ = health_handle.join();
    Ok(())
}

/// Derives the delivered-events sink path alongside the outbox path.
fn sink_path(config: &dcal_config::DcalConfig) -> PathBuf {
    let mut path = PathBuf::from(&config.publisher.outbox_path);
    path.set_extension("delivered.ndjson");
    path
}

/// Verifies the audit chain between `from` and `to`, inclusive.
fn verify_audit(config: &dcal_config::DcalConfig, from: u64, to: u64) -> CliResult<()> {
    let audit = open_audit_store(config)?;
    let broken = audit.verify(from, to).map_err(|err| CliError::Command(err.to_string()))?;
    let mut stdout = std::io::stdout();
    if broken.is_empty() {
        let _ = writeln!(stdout, "audit chain verified clean from sequence {from} to {to}");
        Ok(())
    } else {
        let detail = broken.iter().map(u64::to_string).collect::<Vec<_>>().join(", ");
        Err(CliError::Command(format!("audit chain verification found breaks at sequence numbers: {detail}")))
    }
}

/// Replays everything currently parked in the result publisher's outbox.
fn replay_outbox(config: &dcal_config::DcalConfig) -> CliResult<()> {
    let sink = FileSink::open(&sink_path(config)).map_err(|err| CliError::Command(err.to_string()))?;
    let publisher =
        OutboxPublisher::new(sink, &config.publisher.backoff_schedule_ms, config.publisher.buffer_size, PathBuf::from(&config.publisher.outbox_path));
    let replayed = publisher.replay_outbox().map_err(|err| CliError::Command(err.to_string()))?;
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "replayed {replayed} outbox events");
    Ok(())
}

/// Verifies a candidate rule bundle without live-reloading a running
/// `serve` process; operators swap the file and restart to pick it up.
fn reload_rules(config: &dcal_config::DcalConfig, path: Option<&Path>) -> CliResult<()> {
    let bundle_path = rule_bundle_path(path);
    let audit = open_audit_store(config)?;
    audit.readiness().map_err(|err| CliError::AuditIntegrity(err.to_string()))?;
    let rule_store = load_verified_rule_store(&bundle_path)?;
    let snapshot = rule_store.snapshot();
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "rule bundle at {} verified, version {}", bundle_path.display(), snapshot.version());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(CliError::Config(String::new()).exit_code(), 1);
        assert_eq!(CliError::RuleIntegrity(String::new()).exit_code(), 2);
        assert_eq!(CliError::AuditIntegrity(String::new()).exit_code(), 3);
        assert_eq!(CliError::Command(String::new()).exit_code(), 1);
    }

    #[test]
    fn decode_hex_round_trips_known_bytes() {
        assert_eq!(decode_hex("00ff10").expect("valid hex"), vec![0x00, 0xff, 0x10]);
    }

    #[test]
    fn decode_hex_rejects_odd_length() {
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn decode_hex_rejects_non_hex_digits() {
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn rule_bundle_path_prefers_explicit_override() {
        let override_path = PathBuf::from("/tmp/custom-rules.json");
        assert_eq!(rule_bundle_path(Some(&override_path)), override_path);
    }

    #[test]
    fn rule_bundle_path_falls_back_to_default_when_unset() {
        if std::env::var(RULE_BUNDLE_ENV_VAR).is_err() {
            assert_eq!(rule_bundle_path(None), PathBuf::from(DEFAULT_RULE_BUNDLE_PATH));
        }
    }

    #[test]
    fn sink_path_derives_delivered_suffix_from_outbox_path() {
        let mut config = dcal_config::DcalConfig::default();
        config.publisher.outbox_path = "dcal-outbox.db".to_string();
        assert_eq!(sink_path(&config), PathBuf::from("dcal-outbox.delivered.ndjson"));
    }

    #[test]
    fn build_pipeline_config_carries_thresholds_and_sla_from_config() {
        let config = dcal_config::DcalConfig::default();
        let pipeline_config = build_pipeline_config(&config);
        let expected_thresholds = config.thresholds.to_synthesis_thresholds();
        assert!((pipeline_config.thresholds.high_risk_threshold - expected_thresholds.high_risk_threshold).abs() < f64::EPSILON);
        assert_eq!(pipeline_config.sla_overrides, config.sla.to_overrides_map());
        assert_eq!(pipeline_config.ml_top_n, PipelineConfig::default().ml_top_n);
    }
}

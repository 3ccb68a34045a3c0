// crates/dcal-broker/src/ingest.rs
// ============================================================================
// Module: Ingestion Consumer
// Description: The Ingestion Layer (C9) consumer loop.
// Purpose: Pull batches from a claim source at a bounded rate, verify each
//          envelope, drop duplicates and bad input, and hand valid claims
//          to the pipeline before committing the broker offset.
// Dependencies: dcal-core, crate::{envelope, rate_limiter, idempotency,
//               source}
// ============================================================================

//! ## Overview
//! Spec §4.9's failure handling is encoded directly in [`IngestStats`]
//! rather than exceptions: signature and schema failures are logged and
//! dropped, never escalated; rate-limit pressure sleeps cooperatively
//! instead of dropping; replay-window violations are dropped with a
//! metric. Only a claim that clears every check reaches the pipeline, and
//! the source offset commits once every message in the batch has been
//! handed off or definitively rejected.

use std::collections::BTreeMap;

use time::Date;
use time::OffsetDateTime;

use dcal_core::Claim;
use dcal_core::ClaimAnalysisInputs;
use dcal_core::ClaimDisposition;
use dcal_core::ClaimFields;
use dcal_core::JournalLevel;
use dcal_core::JournalRecord;
use dcal_core::JournalWriter;

use crate::envelope::EnvelopeError;
use crate::envelope::RawEnvelope;
use crate::envelope::verify_envelope;
use crate::idempotency::IdempotencyCache;
use crate::rate_limiter::RateLimitConfig;
use crate::rate_limiter::RateLimitDecision;
use crate::rate_limiter::TokenBucketLimiter;
use crate::source::ClaimSource;
use crate::source::SourceError;

/// Drives one claim through the pipeline once ingestion has admitted it.
/// Implemented by [`dcal_core::ClaimPipeline`] for every combination of
/// its type parameters, so the consumer stays generic over the concrete
/// audit/ML/publisher/journal backends wired in at startup.
pub trait ClaimHandler: Send + Sync {
    /// Processes one verified claim.
    fn handle(&self, claim: Claim, inputs: &ClaimAnalysisInputs) -> ClaimDisposition;
}

impl<A, M, P, J> ClaimHandler for dcal_core::ClaimPipeline<A, M, P, J>
where
    A: dcal_core::AuditSink,
    M: dcal_core::MlEngine,
    P: dcal_core::ReportPublisher,
    J: dcal_core::JournalWriter,
{
    fn handle(&self, claim: Claim, inputs: &ClaimAnalysisInputs) -> ClaimDisposition {
        self.process_claim(claim, inputs)
    }
}

impl<T: ClaimHandler + ?Sized> ClaimHandler for std::sync::Arc<T> {
    fn handle(&self, claim: Claim, inputs: &ClaimAnalysisInputs) -> ClaimDisposition {
        (**self).handle(claim, inputs)
    }
}

/// Running counters for one consumer lifetime, surfaced to the degradation
/// manager and to operators via the journal.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    /// Claims handed to the pipeline.
    pub admitted: u64,
    /// Envelopes dropped for signature failure.
    pub signature_failures: u64,
    /// Envelopes dropped for schema failure.
    pub schema_failures: u64,
    /// Envelopes dropped for replay-window violation.
    pub replay_violations: u64,
    /// Envelopes dropped as exact duplicates.
    pub duplicates: u64,
    /// Times the rate limiter applied backoff.
    pub rate_limited: u64,
}

/// Tuning for one [`IngestionConsumer`], gathered into a struct so the
/// constructor reads cleanly despite the field count.
pub struct IngestionSettings {
    /// Token-bucket rate limiting applied per polled message.
    pub rate_limit: RateLimitConfig,
    /// Maximum tracked idempotency keys.
    pub idempotency_capacity: usize,
    /// HMAC signing key used to verify inbound envelopes.
    pub signing_key: Vec<u8>,
    /// Maximum allowed clock skew, in seconds.
    pub max_skew_seconds: u64,
    /// Maximum messages pulled per `poll_batch` call.
    pub max_messages_per_poll: usize,
}

/// The Ingestion Layer consumer (C9).
pub struct IngestionConsumer<S: ClaimSource, H: ClaimHandler, J: JournalWriter> {
    source: S,
    handler: H,
    journal: J,
    rate_limiter: TokenBucketLimiter,
    idempotency: IdempotencyCache,
    signing_key: Vec<u8>,
    max_skew_seconds: u64,
    max_messages_per_poll: usize,
    stats: std::sync::Mutex<IngestStats>,
}

impl<S: ClaimSource, H: ClaimHandler, J: JournalWriter> IngestionConsumer<S, H, J> {
    /// Builds a consumer over the given source, claim handler, and
    /// journal.
    #[must_use]
    pub fn new(source: S, handler: H, journal: J, settings: IngestionSettings) -> Self {
        Self {
            source,
            handler,
            journal,
            rate_limiter: TokenBucketLimiter::new(settings.rate_limit),
            idempotency: IdempotencyCache::new(settings.idempotency_capacity),
            signing_key: settings.signing_key,
            max_skew_seconds: settings.max_skew_seconds,
            max_messages_per_poll: settings.max_messages_per_poll,
            stats: std::sync::Mutex::new(IngestStats::default()),
        }
    }

    /// Returns a snapshot of the running counters.
    pub fn stats(&self) -> IngestStats {
        *self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Polls and processes one batch, if the source has one available.
    /// Applies the token bucket per message, sleeping cooperatively under
    /// pressure rather than dropping.
    ///
    /// # Errors
    /// Returns [`SourceError`] only when the source itself cannot be
    /// polled or the offset cannot be committed; per-message failures are
    /// handled internally and never propagate.
    pub fn run_once(&self) -> Result<usize, SourceError> {
        let Some(batch) = self.source.poll_batch(self.max_messages_per_poll)? else {
            return Ok(0);
        };

        let mut processed = 0usize;
        for raw in &batch.envelopes {
            loop {
                match self.rate_limiter.check() {
                    RateLimitDecision::Allow => break,
                    RateLimitDecision::Limited { retry_after } => {
                        self.record(|stats| stats.rate_limited += 1);
                        std::thread::sleep(retry_after);
                    }
                }
            }
            self.process_one(raw);
            processed += 1;
        }

        self.source.commit(batch.offset)?;
        Ok(processed)
    }

    fn process_one(&self, raw: &RawEnvelope) {
        let now = OffsetDateTime::now_utc();
        let verified = match verify_envelope(raw, &self.signing_key, self.max_skew_seconds, now) {
            Ok(verified) => verified,
            Err(err) => {
                self.reject(&err);
                return;
            }
        };

        if !self.idempotency.admit(&verified.claim.claim_id, &verified.envelope_hash) {
            self.record(|stats| stats.duplicates += 1);
            self.log(JournalLevel::Info, "INGESTION", None, "duplicate envelope dropped");
            return;
        }

        let fields: ClaimFields = verified.claim.clone().into();
        let claim = match Claim::new(fields, today(now)) {
            Ok(claim) => claim,
            Err(err) => {
                self.record(|stats| stats.schema_failures += 1);
                self.log(JournalLevel::Warn, "INGESTION", Some(verified.claim.claim_id.clone()), &err.to_string());
                return;
            }
        };

        self.record(|stats| stats.admitted += 1);
        let inputs = ClaimAnalysisInputs::default();
        let _ = self.handler.handle(claim, &inputs);
    }

    fn reject(&self, err: &EnvelopeError) {
        match err {
            EnvelopeError::SignatureInvalid => {
                self.record(|stats| stats.signature_failures += 1);
                self.log(JournalLevel::Error, "INGESTION", None, "envelope signature verification failed");
            }
            EnvelopeError::ReplayWindowViolation => {
                self.record(|stats| stats.replay_violations += 1);
                self.log(JournalLevel::Warn, "INGESTION", None, "envelope outside replay window");
            }
            EnvelopeError::SchemaVersionMismatch(_) | EnvelopeError::SchemaInvalid(_) | EnvelopeError::Canonicalization(_) => {
                self.record(|stats| stats.schema_failures += 1);
                self.log(JournalLevel::Warn, "INGESTION", None, &err.to_string());
            }
        }
    }

    fn record(&self, apply: impl FnOnce(&mut IngestStats)) {
        let mut guard = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        apply(&mut guard);
    }

    fn log(&self, level: JournalLevel, stage: &str, claim_id: Option<String>, message: &str) {
        self.journal.write(&JournalRecord {
            timestamp: now_rfc3339(),
            level,
            stage: stage.to_string(),
            claim_id,
            analysis_id: None,
            message: message.to_string(),
            fields: BTreeMap::new(),
        });
    }
}

fn today(now: OffsetDateTime) -> Date {
    now.date()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use hmac::Hmac;
    use hmac::Mac;
    use sha2::Sha256;

    use super::*;
    use crate::source::InMemorySource;

    struct RecordingHandler {
        claim_ids: Mutex<Vec<String>>,
    }

    impl ClaimHandler for RecordingHandler {
        fn handle(&self, claim: Claim, _inputs: &ClaimAnalysisInputs) -> ClaimDisposition {
            self.claim_ids.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(claim.claim_id().to_string());
            ClaimDisposition::Parked { report: build_unused_report(), reason: "test stub".to_string() }
        }
    }

    fn build_unused_report() -> dcal_core::IntelligenceReport {
        dcal_core::IntelligenceReport {
            analysis_id: dcal_core::AnalysisId::new(),
            claim_id: "CLM-2026-000001".to_string(),
            timestamp: now_rfc3339(),
            recommendation: dcal_core::Recommendation::ManualReview,
            confidence_score: 0.0,
            risk_score: 0.0,
            assigned_queue: None,
            priority: dcal_core::Priority::Low,
            sla_hours: 0,
            rule_engine_outcome: dcal_core::AggregateOutcome::Pass,
            ml_engine_outcome: dcal_core::MLEngineResult {
                combined_risk_score: 0.0,
                combined_confidence: 0.0,
                recommendation: "SKIPPED".to_string(),
                model_results: vec![],
                top_risk_factors: vec![],
                anomaly_summary: vec![],
                requires_review: false,
            },
            primary_reasons: vec![],
            secondary_factors: vec![],
            risk_indicators: vec![],
            suggested_actions: vec![],
            related_claims: vec![],
            historical_context: String::new(),
            decision_trace: dcal_core::DecisionTrace::new(),
            processing_time: std::time::Duration::ZERO,
        }
    }

    fn sign(key: &[u8], payload: &serde_json::Value) -> String {
        let canonical = serde_jcs::to_string(payload).expect("canonicalizes");
        let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("valid key");
        mac.update(canonical.as_bytes());
        let digest = mac.finalize().into_bytes();
        digest.iter().fold(String::new(), |mut acc, byte| {
            use std::fmt::Write as _;
            let _ = write!(acc, "{byte:02x}");
            acc
        })
    }

    fn envelope(key: &[u8], claim_id: &str) -> RawEnvelope {
        let payload = serde_json::json!({
            "claim_id": claim_id,
            "policy_id": "POL-1",
            "provider_id": "PRV-1",
            "member_id_hash": "a".repeat(64),
            "procedure_codes": [{
                "code": "99213",
                "code_type": "CPT",
                "quantity": 1,
                "modifiers": [],
                "line_amount": 120.0,
            }],
            "diagnosis_codes": [],
            "billed_amount": 120.0,
            "service_date": "2026-07-01",
            "claim_type": "PROFESSIONAL",
        });
        RawEnvelope {
            envelope_version: "1.0.0".to_string(),
            timestamp: OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).expect("formats"),
            signature: sign(key, &payload),
            payload,
        }
    }

    #[test]
    fn valid_claim_reaches_the_handler_and_commits_the_offset() {
        let key = b"consumer-test-key".to_vec();
        let source = InMemorySource::new(vec![envelope(&key, "CLM-2026-000001")]);
        let handler = RecordingHandler { claim_ids: Mutex::new(vec![]) };
        let consumer = IngestionConsumer::new(
            source,
            handler,
            dcal_core::NullJournal,
            IngestionSettings {
                rate_limit: RateLimitConfig { rate_per_second: 1_000, burst: 10 },
                idempotency_capacity: 100,
                signing_key: key,
                max_skew_seconds: 600,
                max_messages_per_poll: 10,
            },
        );
        let processed = consumer.run_once().expect("polls");
        assert_eq!(processed, 1);
        assert_eq!(consumer.handler.claim_ids.lock().unwrap_or_else(std::sync::PoisonError::into_inner).as_slice(), ["CLM-2026-000001"]);
        assert_eq!(consumer.stats().admitted, 1);
    }

    #[test]
    fn duplicate_envelope_is_dropped_without_reaching_the_handler() {
        let key = b"consumer-test-key".to_vec();
        let env = envelope(&key, "CLM-2026-000002");
        let source = InMemorySource::new(vec![env.clone(), env]);
        let handler = RecordingHandler { claim_ids: Mutex::new(vec![]) };
        let consumer = IngestionConsumer::new(
            source,
            handler,
            dcal_core::NullJournal,
            IngestionSettings {
                rate_limit: RateLimitConfig { rate_per_second: 1_000, burst: 10 },
                idempotency_capacity: 100,
                signing_key: key,
                max_skew_seconds: 600,
                max_messages_per_poll: 10,
            },
        );
        consumer.run_once().expect("polls");
        let stats = consumer.stats();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn tampered_signature_is_dropped_and_counted() {
        let key = b"consumer-test-key".to_vec();
        let mut env = envelope(&key, "CLM-2026-000003");
        env.signature = "0".repeat(64);
        let source = InMemorySource::new(vec![env]);
        let handler = RecordingHandler { claim_ids: Mutex::new(vec![]) };
        let consumer = IngestionConsumer::new(
            source,
            handler,
            dcal_core::NullJournal,
            IngestionSettings {
                rate_limit: RateLimitConfig { rate_per_second: 1_000, burst: 10 },
                idempotency_capacity: 100,
                signing_key: key,
                max_skew_seconds: 600,
                max_messages_per_poll: 10,
            },
        );
        consumer.run_once().expect("polls");
        let stats = consumer.stats();
        assert_eq!(stats.admitted, 0);
        assert_eq!(stats.signature_failures, 1);
    }
}

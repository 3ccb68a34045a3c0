// crates/dcal-broker/src/publisher.rs
// ============================================================================
// Module: Result Publisher
// Description: Fire-and-forget emission of IntelligenceReport events (C10).
// Purpose: At-least-once delivery with bounded buffering, retry backoff,
//          and a durable outbox for events that exhaust their retries.
// Dependencies: dcal-core, serde_json, std::sync, std::fs
// ============================================================================

//! ## Overview
//! Publication is advisory (spec §6): the backend must not treat it as
//! authoritative, so losing a report to a full outbox file is a
//! durability bug but never a correctness one for the pipeline itself.
//! Backpressure applies to the caller (the Decision Synthesizer, via
//! [`dcal_core::PublishError::BufferFull`]), never to the downstream
//! sink.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use dcal_core::IntelligenceReport;
use dcal_core::PublishError;
use dcal_core::ReportPublisher;

/// A downstream sink a report is handed to once admitted past the
/// in-memory buffer. Mirrors the teacher's `Sink` trait shape, narrowed to
/// one method since the publisher has exactly one delivery target.
pub trait EventSink: Send + Sync {
    /// Delivers one serialized `claims.analyzed` event.
    ///
    /// # Errors
    /// Returns an error string when delivery fails; the publisher treats
    /// any error as retryable.
    fn deliver(&self, event: &serde_json::Value) -> Result<(), String>;
}

/// A sink that always fails, used to exercise the outbox fallback path
/// without a real downstream dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn deliver(&self, _event: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }
}

/// A sink that appends every delivered event as one NDJSON line, standing
/// in for a real downstream broker topic where none is configured. Unlike
/// [`NullSink`], a deployment can inspect what was actually published.
pub struct FileSink {
    file: Mutex<std::fs::File>,
}

impl FileSink {
    /// Opens (creating if absent) `path` for append.
    ///
    /// # Errors
    /// Returns the underlying [`std::io::Error`] if the file cannot be
    /// opened for append.
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl EventSink for FileSink {
    fn deliver(&self, event: &serde_json::Value) -> Result<(), String> {
        let mut line = serde_json::to_string(event).map_err(|err| err.to_string())?;
        line.push('\n');
        let mut guard = self.file.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.write_all(line.as_bytes()).map_err(|err| err.to_string())
    }
}

/// Builds the outbound `claims.analyzed` event per spec §6, including a
/// placeholder `signature` field — real deployments sign this with the
/// same HMAC key material the ingestion side verifies against.
fn build_event(report: &IntelligenceReport) -> serde_json::Value {
    serde_json::json!({
        "envelope_version": "1.0.0",
        "claim_id": report.claim_id,
        "analysis_id": report.analysis_id,
        "timestamp": report.timestamp,
        "recommendation": report.recommendation.as_label(),
        "confidence_score": report.confidence_score,
        "risk_score": report.risk_score,
        "assigned_queue": report.assigned_queue.map(dcal_core::ReviewQueue::as_label),
        "priority": report.priority,
        "sla_hours": report.sla_hours,
        "rule_engine_outcome": report.rule_engine_outcome,
        "ml_engine_outcome": report.ml_engine_outcome,
        "primary_reasons": report.primary_reasons,
        "secondary_factors": report.secondary_factors,
        "risk_indicators": report.risk_indicators,
        "suggested_actions": report.suggested_actions,
        "related_claims": report.related_claims,
        "historical_context": report.historical_context,
        "decision_trace": report.decision_trace,
        "processing_time_ms": u64::try_from(report.processing_time.as_millis()).unwrap_or(u64::MAX),
    })
}

/// Retry/outbox-backed publisher for `claims.analyzed` events.
pub struct OutboxPublisher<S: EventSink> {
    sink: S,
    backoff_schedule: Vec<std::time::Duration>,
    buffer_size: usize,
    in_flight: AtomicUsize,
    outbox_path: std::path::PathBuf,
    outbox: Mutex<()>,
}

impl<S: EventSink> OutboxPublisher<S> {
    /// Creates a publisher backed by `sink`, retrying per `backoff_schedule_ms`
    /// (held at the last value once exhausted) before spilling to the
    /// durable outbox file at `outbox_path`.
    #[must_use]
    pub fn new(sink: S, backoff_schedule_ms: &[u64], buffer_size: usize, outbox_path: std::path::PathBuf) -> Self {
        Self {
            sink,
            backoff_schedule: backoff_schedule_ms.iter().map(|ms| std::time::Duration::from_millis(*ms)).collect(),
            buffer_size,
            in_flight: AtomicUsize::new(0),
            outbox_path,
            outbox: Mutex::new(()),
        }
    }

    fn retry_then_park(&self, event: &serde_json::Value) -> Result<(), PublishError> {
        let steps = if self.backoff_schedule.is_empty() { 1 } else { self.backoff_schedule.len() };
        for attempt in 0 .. steps {
            if self.sink.deliver(event).is_ok() {
                return Ok(());
            }
            if let Some(delay) = self.backoff_schedule.get(attempt) {
                std::thread::sleep(*delay);
            }
        }
        self.park(event)
    }

    fn park(&self, event: &serde_json::Value) -> Result<(), PublishError> {
        let _guard = self.outbox.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbox_path)
            .map_err(|err| PublishError::Channel(err.to_string()))?;
        let mut line = serde_json::to_string(event).map_err(|err| PublishError::Channel(err.to_string()))?;
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(|err| PublishError::Channel(err.to_string()))?;
        Ok(())
    }
}

impl<S: EventSink> ReportPublisher for OutboxPublisher<S> {
    fn publish(&self, report: &IntelligenceReport) -> Result<(), PublishError> {
        if self.in_flight.load(Ordering::SeqCst) >= self.buffer_size {
            return Err(PublishError::BufferFull);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let event = build_event(report);
        let result = self.retry_then_park(&event);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn replay_outbox(&self) -> Result<u64, PublishError> {
        let _guard = self.outbox.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !self.outbox_path.exists() {
            return Ok(0);
        }
        let content = std::fs::read_to_string(&self.outbox_path).map_err(|err| PublishError::Channel(err.to_string()))?;
        let mut replayed = 0u64;
        let mut remaining = String::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: serde_json::Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(_) => {
                    remaining.push_str(line);
                    remaining.push('\n');
                    continue;
                }
            };
            if self.sink.deliver(&event).is_ok() {
                replayed += 1;
            } else {
                remaining.push_str(line);
                remaining.push('\n');
            }
        }
        std::fs::write(&self.outbox_path, remaining).map_err(|err| PublishError::Channel(err.to_string()))?;
        Ok(replayed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    use super::*;
    use dcal_core::AggregateOutcome;
    use dcal_core::DecisionTrace;
    use dcal_core::MLEngineResult;
    use dcal_core::Priority;
    use dcal_core::Recommendation;
    use dcal_core::ReviewQueue;

    struct FailingSink;
    impl EventSink for FailingSink {
        fn deliver(&self, _event: &serde_json::Value) -> Result<(), String> {
            Err("always fails".to_string())
        }
    }

    struct FlakySink {
        should_fail: AtomicBool,
    }
    impl EventSink for FlakySink {
        fn deliver(&self, _event: &serde_json::Value) -> Result<(), String> {
            if self.should_fail.swap(false, Ordering::SeqCst) { Err("transient".to_string()) } else { Ok(()) }
        }
    }

    fn sample_report() -> IntelligenceReport {
        IntelligenceReport {
            analysis_id: dcal_core::AnalysisId::new(),
            claim_id: "CLM-2026-000001".to_string(),
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).expect("formats"),
            recommendation: Recommendation::AutoApprove,
            confidence_score: 0.9,
            risk_score: 0.1,
            assigned_queue: None,
            priority: Priority::Low,
            sla_hours: 0,
            rule_engine_outcome: AggregateOutcome::Pass,
            ml_engine_outcome: MLEngineResult {
                combined_risk_score: 0.1,
                combined_confidence: 0.9,
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
            decision_trace: DecisionTrace::new(),
            processing_time: std::time::Duration::from_millis(10),
        }
    }

    #[test]
    fn successful_delivery_does_not_touch_the_outbox() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outbox = dir.path().join("outbox.ndjson");
        let publisher = OutboxPublisher::new(NullSink, &[10], 4, outbox.clone());
        assert!(publisher.publish(&sample_report()).is_ok());
        assert!(!outbox.exists());
    }

    #[test]
    fn exhausted_retries_park_in_the_outbox_and_replay_later() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outbox = dir.path().join("outbox.ndjson");
        let publisher = OutboxPublisher::new(FailingSink, &[1, 1], 4, outbox.clone());
        assert!(publisher.publish(&sample_report()).is_ok());
        assert!(outbox.exists());

        let replayer = OutboxPublisher::new(FlakySink { should_fail: AtomicBool::new(false) }, &[1], 4, outbox);
        let replayed = replayer.replay_outbox().expect("replays");
        assert_eq!(replayed, 1);
    }

    #[test]
    fn file_sink_appends_one_line_per_delivered_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("delivered.ndjson");
        let sink = FileSink::open(&path).expect("opens");
        let publisher = OutboxPublisher::new(sink, &[10], 4, dir.path().join("outbox.ndjson"));
        publisher.publish(&sample_report()).expect("publishes");
        publisher.publish(&sample_report()).expect("publishes");
        let contents = std::fs::read_to_string(&path).expect("reads");
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn buffer_pressure_rejects_before_attempting_delivery() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outbox = dir.path().join("outbox.ndjson");
        let publisher = OutboxPublisher::new(FailingSink, &[1], 0, outbox);
        let err = publisher.publish(&sample_report()).expect_err("buffer is zero-capacity");
        assert!(matches!(err, PublishError::BufferFull));
    }
}

// crates/dcal-core/src/runtime/pipeline.rs
// ============================================================================
// Module: Claim Pipeline
// Description: Orchestrates one claim through ingestion-adjacent validation,
//              the Rule Engine, the ML Engine, the Decision Synthesizer, the
//              Audit Store, and the Result Publisher (§4.11/§4.12).
// Purpose: Own the claim state machine, consult the Degradation Manager
//          once per claim, and make the single forward pass from a
//          validated `Claim` to a published or parked `IntelligenceReport`.
// Dependencies: crate::core, crate::interfaces, crate::runtime::*
// ============================================================================

//! ## Overview
//! By the time a [`Claim`] reaches [`ClaimPipeline::process_claim`] it has
//! already passed [`Claim::new`]'s field validation; `REJECTED` and
//! `DROPPED` (duplicate/replay) are ingestion-layer outcomes that never
//! reach this type. This orchestrator only ever returns `PUBLISHED` or
//! `PARKED`.
//!
//! The state machine `RECEIVED -> VALIDATED -> RULES_STARTED ->
//! RULES_COMPLETED -> [ML_STARTED -> ML_COMPLETED]? -> SYNTHESIS_STARTED ->
//! SYNTHESIS_COMPLETED -> PUBLISHED` is recorded into the claim's
//! [`DecisionTrace`] up through the point the trace locks. The trace locks
//! inside [`synthesize`] once the report's own fields are fixed, so the
//! two transitions that exist only after that point — `SYNTHESIS_COMPLETED`
//! and `PUBLISHED` — cannot themselves be appended to the now-immutable
//! trace without invalidating its integrity hash; they are emitted to the
//! operational journal instead.

use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::claim::Claim;
use crate::core::claim::ClaimContext;
use crate::core::identifiers::AnalysisId;
use crate::core::ml::MLEngineResult;
use crate::core::ml::aggregate_model_results;
use crate::core::report::IntelligenceReport;
use crate::core::report::Priority;
use crate::core::report::RelatedClaim;
use crate::core::report::ReviewQueue;
use crate::core::rule::AggregateOutcome;
use crate::core::rule::RuleEngineResult;
use crate::core::trace::DecisionEntry;
use crate::core::trace::DecisionTrace;
use crate::core::trace::StageMarker;
use crate::diagnostics::JournalLevel;
use crate::diagnostics::JournalRecord;
use crate::diagnostics::JournalWriter;
use crate::interfaces::AuditSink;
use crate::interfaces::MlEngine;
use crate::interfaces::ReportPublisher;
use crate::runtime::breaker::BreakerConfig;
use crate::runtime::breaker::CallPermit;
use crate::runtime::breaker::CircuitBreaker;
use crate::runtime::degradation::DegradationState;
use crate::runtime::executors::ExecutorPlan;
use crate::runtime::executors::select_executor;
use crate::runtime::queue_router::QueueCapacity;
use crate::runtime::queue_router::sla_hours;
use crate::runtime::rule_engine::DEFAULT_ENGINE_BUDGET;
use crate::runtime::rule_engine::evaluate_rules;
use crate::runtime::rule_store::RuleStore;
use crate::runtime::synthesizer::DEFAULT_ENGINE_VERSION;
use crate::runtime::synthesizer::SynthesisThresholds;
use crate::runtime::synthesizer::synthesize;

/// Per-claim processing budgets (§5). Only the total `claim_budget` is
/// enforced here; the per-model ML budget and fan-in cap are the `MlEngine`
/// implementation's own responsibility, since `score_claim` treats model
/// scoring as an opaque, already-bounded call.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBudgets {
    /// Total wall-clock budget for one claim (default 2s).
    pub claim_budget: Duration,
    /// Rule Engine budget, forwarded to [`evaluate_rules`] (default 50ms).
    pub rule_engine_budget: Duration,
}

impl Default for PipelineBudgets {
    fn default() -> Self {
        Self { claim_budget: Duration::from_secs(2), rule_engine_budget: DEFAULT_ENGINE_BUDGET }
    }
}

/// Static configuration for a [`ClaimPipeline`], distinct from the
/// per-dependency runtime state ([`RuleStore`], [`DegradationState`],
/// breakers).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Stamped onto rule engine results.
    pub engine_version: String,
    /// Per-claim budgets.
    pub budgets: PipelineBudgets,
    /// Per-dependency circuit breaker tuning.
    pub audit_breaker: BreakerConfig,
    /// Per-dependency circuit breaker tuning.
    pub publish_breaker: BreakerConfig,
    /// Decision synthesis thresholds.
    pub thresholds: SynthesisThresholds,
    /// Per-queue capacity snapshots consulted by queue routing.
    pub queue_capacities: BTreeMap<ReviewQueue, QueueCapacity>,
    /// SLA overrides keyed by `(priority, queue)`.
    pub sla_overrides: BTreeMap<(Priority, ReviewQueue), u32>,
    /// Weights applied to each model's confidence when aggregating ML
    /// results, keyed by `model_id`.
    pub ml_weights: BTreeMap<String, f64>,
    /// Top-N risk factors retained per claim by the ML Engine.
    pub ml_top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine_version: DEFAULT_ENGINE_VERSION.to_string(),
            budgets: PipelineBudgets::default(),
            audit_breaker: BreakerConfig::default(),
            publish_breaker: BreakerConfig::default(),
            thresholds: SynthesisThresholds::default(),
            queue_capacities: BTreeMap::new(),
            sla_overrides: BTreeMap::new(),
            ml_weights: BTreeMap::new(),
            ml_top_n: 10,
        }
    }
}

/// The final disposition of one claim's pass through the pipeline. Never
/// `REJECTED`/`DROPPED` — those are ingestion-layer outcomes that never
/// produce a `Claim` this orchestrator sees.
#[derive(Debug, Clone)]
pub enum ClaimDisposition {
    /// The report was durably audited and published.
    Published(IntelligenceReport),
    /// The report exists and (when the audit write itself succeeded) is
    /// durably recorded, but publication did not happen; queued for replay.
    Parked {
        /// The synthesized report.
        report: IntelligenceReport,
        /// Why the claim was parked instead of published.
        reason: String,
    },
}

/// Extra per-claim inputs the pipeline itself does not derive: the
/// applicability keys rule evaluation needs, and reviewer-facing context
/// assembled by correlation lookups outside this crate's scope.
#[derive(Debug, Clone, Default)]
pub struct ClaimAnalysisInputs {
    /// Claim type label matched against rule applicability (e.g.
    /// `"PROFESSIONAL"`).
    pub claim_type_label: String,
    /// Jurisdiction code matched against rule applicability.
    pub jurisdiction: String,
    /// Related claims, pre-ranked by the caller; only the configured
    /// top-N is retained by synthesis.
    pub related_claims: Vec<RelatedClaim>,
    /// Free-form historical-context summary for the reviewer.
    pub historical_context: String,
}

/// Orchestrates one claim end to end: Rule Engine (C3) -> ML Engine (C4) ->
/// Decision Synthesizer (C5) -> Audit Store (C7) -> Result Publisher (C10),
/// consulting the Degradation Manager (C8) once per claim to pick a
/// [`ExecutorPlan`] (C12).
pub struct ClaimPipeline<A, M, P, J> {
    rule_store: RuleStore,
    degradation: DegradationState,
    audit: A,
    ml_engine: M,
    publisher: P,
    journal: J,
    audit_breaker: CircuitBreaker,
    publish_breaker: CircuitBreaker,
    config: PipelineConfig,
}

impl<A, M, P, J> ClaimPipeline<A, M, P, J>
where
    A: AuditSink,
    M: MlEngine,
    P: ReportPublisher,
    J: JournalWriter,
{
    /// Builds a pipeline over already-constructed dependencies. The rule
    /// store must already hold a verified initial snapshot; the
    /// degradation state starts at L0 Full.
    pub fn new(rule_store: RuleStore, audit: A, ml_engine: M, publisher: P, journal: J, config: PipelineConfig) -> Self {
        let audit_breaker = CircuitBreaker::new(config.audit_breaker);
        let publish_breaker = CircuitBreaker::new(config.publish_breaker);
        Self {
            rule_store,
            degradation: DegradationState::new(),
            audit,
            ml_engine,
            publisher,
            journal,
            audit_breaker,
            publish_breaker,
            config,
        }
    }

    /// Returns the degradation state holder, so a health-monitor task can
    /// publish newly selected levels (§4.8).
    #[must_use]
    pub const fn degradation(&self) -> &DegradationState {
        &self.degradation
    }

    /// Returns the rule store, so a `reload-rules` operation can swap in a
    /// freshly verified snapshot (§4.2).
    #[must_use]
    pub const fn rule_store(&self) -> &RuleStore {
        &self.rule_store
    }

    /// Processes one validated claim through the full pipeline, returning
    /// its final disposition. Never panics: every fallible stage degrades
    /// to a conservative outcome rather than aborting.
    pub fn process_claim(&self, claim: Claim, inputs: &ClaimAnalysisInputs) -> ClaimDisposition {
        let overall_started = Instant::now();
        let mut trace = DecisionTrace::new();
        let now = now_rfc3339();

        mark(&mut trace, "RECEIVED", overall_started, &now);
        mark(&mut trace, "VALIDATED", overall_started, &now);
        self.journal(&claim, None, JournalLevel::Info, "RECEIVED", "claim accepted for analysis");

        let level = self.degradation.current();
        let plan = select_executor(level);

        let snapshot = self.rule_store.snapshot();
        let context = ClaimContext::new(&claim);
        let eval_ctx = dcal_expr::EvalContext::new(claim.service_date());

        mark(&mut trace, "RULES_STARTED", overall_started, &now);
        let rule_result = evaluate_rules(
            &snapshot,
            &claim,
            &context,
            &eval_ctx,
            &inputs.claim_type_label,
            &inputs.jurisdiction,
            self.config.budgets.rule_engine_budget,
            &self.config.engine_version,
            &now,
        );
        mark(&mut trace, "RULES_COMPLETED", overall_started, &now);

        if overall_started.elapsed() > self.config.budgets.claim_budget {
            let ml_result = aggregate_model_results(&[], &BTreeMap::new(), self.config.ml_top_n);
            let report =
                self.budget_exceeded_report(&claim, trace, "RULES_COMPLETED", &now, &rule_result, &ml_result, overall_started.elapsed());
            return self.finish(report, &plan, &now);
        }

        let invoke_ml = plan.invoke_ml && rule_result.aggregate_outcome != AggregateOutcome::Fail;
        let ml_result = if invoke_ml {
            mark(&mut trace, "ML_STARTED", overall_started, &now);
            let result = self.ml_engine.score_claim(&claim);
            mark(&mut trace, "ML_COMPLETED", overall_started, &now);
            result
        } else if rule_result.aggregate_outcome == AggregateOutcome::Fail {
            aggregate_model_results(&[], &BTreeMap::new(), self.config.ml_top_n)
        } else {
            ml_skipped_result()
        };

        if overall_started.elapsed() > self.config.budgets.claim_budget {
            let report =
                self.budget_exceeded_report(&claim, trace, "ML_COMPLETED", &now, &rule_result, &ml_result, overall_started.elapsed());
            return self.finish(report, &plan, &now);
        }

        let mut thresholds = self.config.thresholds;
        thresholds.auto_approve_ml_threshold *= plan.auto_approve_ml_threshold_multiplier;
        if plan.force_manual_review {
            thresholds.auto_approve_max_amount = -1.0;
        } else if plan.auto_approve_requires_small_amount {
            thresholds.auto_approve_max_amount = thresholds.auto_approve_max_amount.min(plan.small_amount_ceiling);
        }

        mark(&mut trace, "SYNTHESIS_STARTED", overall_started, &now);
        let mut report = synthesize(
            &claim,
            &rule_result,
            &ml_result,
            &thresholds,
            &self.config.queue_capacities,
            &self.config.sla_overrides,
            &inputs.related_claims,
            inputs.historical_context.clone(),
            &now,
            trace,
        );

        if plan.force_manual_review && rule_result.aggregate_outcome == AggregateOutcome::Pass {
            self.apply_forced_manual_review(&mut report, &claim);
        }
        report.processing_time = overall_started.elapsed();

        self.journal(
            &claim,
            Some(report.analysis_id),
            JournalLevel::Info,
            "SYNTHESIS_COMPLETED",
            "decision synthesized",
        );

        self.finish(report, &plan, &now)
    }

    /// Overrides an otherwise-`AUTO_APPROVE` report to `MANUAL_REVIEW` with
    /// priority tiered by billed amount, for L4 Manual-only and L5
    /// Emergency. Rule-triggered `FAIL`/`FLAG` routing (fraud investigation,
    /// compliance, medical necessity) is left untouched: the rule engine
    /// already computed a more informative destination than a blanket
    /// amount tier would give, and this forced-review policy should not
    /// discard that signal (see `DESIGN.md`).
    fn apply_forced_manual_review(&self, report: &mut IntelligenceReport, claim: &Claim) {
        if report.recommendation != crate::core::report::Recommendation::AutoApprove {
            return;
        }
        let (queue, priority) = tier_by_amount(claim.billed_amount(), &self.config.thresholds);
        report.recommendation = crate::core::report::Recommendation::ManualReview;
        report.assigned_queue = Some(queue);
        report.priority = priority;
        report.sla_hours = sla_hours(priority, queue, &self.config.sla_overrides);
        self.journal(
            claim,
            Some(report.analysis_id),
            JournalLevel::Warn,
            "EXECUTOR_OVERRIDE",
            "forced manual review by degraded-mode executor plan",
        );
    }

    fn budget_exceeded_report(
        &self,
        claim: &Claim,
        mut trace: DecisionTrace,
        overrun_stage: &str,
        timestamp: &str,
        rule_result: &RuleEngineResult,
        ml_result: &MLEngineResult,
        elapsed: Duration,
    ) -> IntelligenceReport {
        let mut details = BTreeMap::new();
        details.insert("overran_stage".to_string(), overrun_stage.to_string());
        let _ = trace.record_decision(DecisionEntry {
            decision_type: "BUDGET_EXCEEDED".to_string(),
            reason: format!("claim processing budget exceeded during {overrun_stage}"),
            details,
            timestamp: timestamp.to_string(),
        });
        mark(&mut trace, overrun_stage, Instant::now() - elapsed, timestamp);
        trace.lock();

        let rule_risk = if rule_result.aggregate_outcome == AggregateOutcome::Fail { 1.0 } else { 0.0 };
        self.journal(claim, None, JournalLevel::Warn, "BUDGET_EXCEEDED", overrun_stage);

        IntelligenceReport {
            analysis_id: AnalysisId::new(),
            claim_id: claim.claim_id().to_string(),
            timestamp: timestamp.to_string(),
            recommendation: crate::core::report::Recommendation::ManualReview,
            confidence_score: 0.0,
            risk_score: rule_risk.max(ml_result.combined_risk_score).clamp(0.0, 1.0),
            assigned_queue: Some(ReviewQueue::StandardReview),
            priority: Priority::Medium,
            sla_hours: sla_hours(Priority::Medium, ReviewQueue::StandardReview, &self.config.sla_overrides),
            rule_engine_outcome: rule_result.aggregate_outcome,
            ml_engine_outcome: ml_result.clone(),
            primary_reasons: vec![format!("processing budget exceeded during {overrun_stage}")],
            secondary_factors: Vec::new(),
            risk_indicators: Vec::new(),
            suggested_actions: vec!["Assign to next available reviewer.".to_string()],
            related_claims: Vec::new(),
            historical_context: String::new(),
            decision_trace: trace,
            processing_time: elapsed,
        }
    }

    fn finish(&self, report: IntelligenceReport, plan: &ExecutorPlan, timestamp: &str) -> ClaimDisposition {
        match self.write_audit(&report) {
            Ok(()) => {}
            Err(reason) => return ClaimDisposition::Parked { report, reason },
        }

        if plan.suppress_publish {
            self.journal(
                &stub_claim(&report.claim_id),
                Some(report.analysis_id),
                JournalLevel::Warn,
                "PUBLISH_SUPPRESSED",
                "emergency executor plan suppressed publication; parked for replay",
            );
            return ClaimDisposition::Parked {
                report,
                reason: "publish suppressed by emergency degraded-mode plan".to_string(),
            };
        }

        match self.publish_breaker.try_call() {
            CallPermit::Rejected => {
                return ClaimDisposition::Parked { report, reason: "publish circuit open".to_string() };
            }
            CallPermit::Allowed => {}
        }
        match self.publisher.publish(&report) {
            Ok(()) => {
                self.publish_breaker.record_success();
                self.journal(&stub_claim(&report.claim_id), Some(report.analysis_id), JournalLevel::Info, "PUBLISHED", "report published");
                let _ = timestamp;
                ClaimDisposition::Published(report)
            }
            Err(err) => {
                self.publish_breaker.record_failure();
                ClaimDisposition::Parked { report, reason: format!("publish failed: {err}") }
            }
        }
    }

    fn write_audit(&self, report: &IntelligenceReport) -> Result<(), String> {
        match self.audit_breaker.try_call() {
            CallPermit::Rejected => return Err("audit circuit open".to_string()),
            CallPermit::Allowed => {}
        }
        let snapshot = crate::core::audit::ReportSnapshot::from_report(report);
        match self.audit.append(report.analysis_id, &report.claim_id, &report.timestamp, snapshot) {
            Ok(_record) => {
                self.audit_breaker.record_success();
                Ok(())
            }
            Err(err) => {
                self.audit_breaker.record_failure();
                Err(format!("audit write failed: {err}"))
            }
        }
    }

    fn journal(&self, claim: &Claim, analysis_id: Option<AnalysisId>, level: JournalLevel, stage: &str, message: &str) {
        self.journal.write(&JournalRecord {
            timestamp: now_rfc3339(),
            level,
            stage: stage.to_string(),
            claim_id: Some(claim.claim_id().to_string()),
            analysis_id: analysis_id.map(|id| id.to_string()),
            message: message.to_string(),
            fields: BTreeMap::new(),
        });
    }
}

fn mark(trace: &mut DecisionTrace, name: &str, started: Instant, timestamp: &str) {
    let _ = trace.record_stage(StageMarker {
        stage_name: name.to_string(),
        timestamp: timestamp.to_string(),
        duration: started.elapsed(),
        details: BTreeMap::new(),
    });
}

/// A neutral-favorable ML result standing in for a deliberately skipped ML
/// Engine call (L3 Rules-only), distinct from [`aggregate_model_results`]'s
/// empty-input default (`risk=0.5, confidence=0`), which models a failed or
/// unavailable engine rather than one intentionally not consulted.
fn ml_skipped_result() -> MLEngineResult {
    MLEngineResult {
        combined_risk_score: 0.0,
        combined_confidence: 1.0,
        recommendation: "SKIPPED".to_string(),
        model_results: Vec::new(),
        top_risk_factors: Vec::new(),
        anomaly_summary: Vec::new(),
        requires_review: false,
    }
}

const fn tier_by_amount(billed_amount: f64, thresholds: &SynthesisThresholds) -> (ReviewQueue, Priority) {
    if billed_amount > thresholds.medical_director_amount_threshold {
        (ReviewQueue::SeniorReview, Priority::High)
    } else if billed_amount > thresholds.senior_review_amount_threshold {
        (ReviewQueue::SeniorReview, Priority::Medium)
    } else {
        (ReviewQueue::StandardReview, Priority::Low)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Builds a throwaway [`Claim`]-shaped handle for journaling after a
/// report already exists and the original claim has been consumed. Only
/// `claim_id` is populated; journaling never reads anything else.
fn stub_claim(claim_id: &str) -> ClaimIdOnly<'_> {
    ClaimIdOnly(claim_id)
}

struct ClaimIdOnly<'a>(&'a str);

impl ClaimIdOnly<'_> {
    fn claim_id(&self) -> &str {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::Date;
    use time::Month;

    use super::*;
    use crate::core::audit::AuditRecord;
    use crate::core::claim::ClaimFields;
    use crate::core::claim::ClaimType;
    use crate::core::claim::CodeType;
    use crate::core::claim::ProcedureCode;
    use crate::core::identifiers::PolicyId;
    use crate::core::identifiers::ProviderId;
    use crate::core::ml::ModelResult;
    use crate::core::rule::Applicability;
    use crate::core::rule::RuleCategory;
    use crate::core::rule::RuleDefinition;
    use crate::core::rule::Ruleset;
    use crate::core::rule::RulesetStatus;
    use crate::core::rule::Severity;
    use crate::interfaces::AuditError;
    use crate::interfaces::PublishError;
    use crate::interfaces::ScorerError;
    use crate::runtime::rule_store::RuleSnapshot;
    use crate::diagnostics::NullJournal;

    struct StubAudit {
        sequence: Mutex<u64>,
        last_hash: Mutex<String>,
    }

    impl StubAudit {
        fn new() -> Self {
            Self { sequence: Mutex::new(0), last_hash: Mutex::new(crate::core::audit::GENESIS_HASH.to_string()) }
        }
    }

    impl AuditSink for StubAudit {
        fn append(
            &self,
            analysis_id: AnalysisId,
            claim_id: &str,
            timestamp: &str,
            snapshot: crate::core::audit::ReportSnapshot,
        ) -> Result<AuditRecord, AuditError> {
            let mut seq_guard = self.sequence.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut hash_guard = self.last_hash.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let record = AuditRecord::next(*seq_guard, analysis_id, claim_id, timestamp, snapshot, &hash_guard)
                .map_err(|err| AuditError::Sink(err.to_string()))?;
            *seq_guard += 1;
            *hash_guard = record.chain_hash.clone();
            Ok(record)
        }

        fn last_chain_hash(&self) -> Result<String, AuditError> {
            Ok(self.last_hash.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone())
        }

        fn verify(&self, _from_seq: u64, _to_seq: u64) -> Result<Vec<u64>, AuditError> {
            Ok(Vec::new())
        }
    }

    struct StubPublisher {
        published: Mutex<Vec<String>>,
    }

    impl StubPublisher {
        fn new() -> Self {
            Self { published: Mutex::new(Vec::new()) }
        }
    }

    impl ReportPublisher for StubPublisher {
        fn publish(&self, report: &IntelligenceReport) -> Result<(), PublishError> {
            self.published.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(report.claim_id.clone());
            Ok(())
        }

        fn replay_outbox(&self) -> Result<u64, PublishError> {
            Ok(0)
        }
    }

    struct NeutralMlEngine;

    impl MlEngine for NeutralMlEngine {
        fn score_claim(&self, _claim: &Claim) -> MLEngineResult {
            let results = vec![ModelResult { risk_score: 0.1, confidence: 0.95, ..ModelResult::degraded(crate::core::identifiers::ModelId::from("m1")) }];
            aggregate_model_results(&results, &BTreeMap::new(), 10)
        }
    }

    struct FailingMlScorer;

    impl crate::interfaces::MlScorer for FailingMlScorer {
        fn score(&self, _claim: &Claim) -> Result<ModelResult, ScorerError> {
            Err(ScorerError::TimedOut { model_id: "m1".to_string() })
        }
    }

    fn claim(billed_amount: f64) -> Claim {
        let today = Date::from_calendar_date(2026, Month::July, 28).expect("valid");
        Claim::new(
            ClaimFields {
                claim_id: "CLM-2026-000001".to_string(),
                policy_id: PolicyId::from("POL-1"),
                provider_id: ProviderId::from("PRV-1"),
                member_id_hash: "a".repeat(64),
                procedure_codes: vec![ProcedureCode {
                    code: "99213".to_string(),
                    code_type: CodeType::Cpt,
                    quantity: 1,
                    modifiers: vec![],
                    line_amount: billed_amount,
                }],
                diagnosis_codes: vec![],
                billed_amount,
                service_date: today.previous_day().expect("valid"),
                service_date_end: None,
                claim_type: ClaimType::Professional,
                admission_date: None,
                discharge_date: None,
            },
            today,
        )
        .expect("valid claim")
    }

    fn rule_store_with_one_passing_rule() -> RuleStore {
        let mut rule = RuleDefinition {
            rule_id: crate::core::identifiers::RuleId::from("R-1"),
            version: "1.0.0".to_string(),
            name: "always true".to_string(),
            category: RuleCategory::Custom,
            severity: Severity::Minor,
            enabled: true,
            condition_expression: "true".to_string(),
            parameters: BTreeMap::new(),
            applies_to: Applicability::default(),
            effective_date: "2020-01-01T00:00:00Z".to_string(),
            expiration_date: None,
            checksum: String::new(),
            tags: Vec::new(),
        };
        rule.checksum = rule.expected_checksum();
        let ruleset = Ruleset {
            version: "1.0.0".to_string(),
            status: RulesetStatus::Active,
            rule_ids: vec![rule.rule_id.clone()],
            activated_at: None,
        };
        RuleStore::new(RuleSnapshot::build(&[ruleset], &[rule]).expect("builds"))
    }

    fn inputs() -> ClaimAnalysisInputs {
        ClaimAnalysisInputs {
            claim_type_label: "PROFESSIONAL".to_string(),
            jurisdiction: "US".to_string(),
            related_claims: Vec::new(),
            historical_context: String::new(),
        }
    }

    #[test]
    fn clean_claim_publishes() {
        let pipeline = ClaimPipeline::new(
            rule_store_with_one_passing_rule(),
            StubAudit::new(),
            NeutralMlEngine,
            StubPublisher::new(),
            NullJournal,
            PipelineConfig::default(),
        );
        let disposition = pipeline.process_claim(claim(120.0), &inputs());
        match disposition {
            ClaimDisposition::Published(report) => {
                assert_eq!(report.recommendation, crate::core::report::Recommendation::AutoApprove);
                assert!(report.decision_trace.is_locked());
            }
            ClaimDisposition::Parked { reason, .. } => panic!("expected publication, got parked: {reason}"),
        }
    }

    struct AlwaysFailingAudit;

    impl AuditSink for AlwaysFailingAudit {
        fn append(
            &self,
            _analysis_id: AnalysisId,
            _claim_id: &str,
            _timestamp: &str,
            _snapshot: crate::core::audit::ReportSnapshot,
        ) -> Result<AuditRecord, AuditError> {
            Err(AuditError::Sink("store unreachable".to_string()))
        }

        fn last_chain_hash(&self) -> Result<String, AuditError> {
            Ok(crate::core::audit::GENESIS_HASH.to_string())
        }

        fn verify(&self, _from_seq: u64, _to_seq: u64) -> Result<Vec<u64>, AuditError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn audit_failure_parks_instead_of_publishing() {
        let pipeline = ClaimPipeline::new(
            rule_store_with_one_passing_rule(),
            AlwaysFailingAudit,
            NeutralMlEngine,
            StubPublisher::new(),
            NullJournal,
            PipelineConfig::default(),
        );
        let disposition = pipeline.process_claim(claim(120.0), &inputs());
        assert!(matches!(disposition, ClaimDisposition::Parked { .. }));
    }

    #[test]
    fn manual_only_degradation_forces_review_regardless_of_amount() {
        let pipeline = ClaimPipeline::new(
            rule_store_with_one_passing_rule(),
            StubAudit::new(),
            NeutralMlEngine,
            StubPublisher::new(),
            NullJournal,
            PipelineConfig::default(),
        );
        pipeline.degradation().update(crate::runtime::degradation::DegradationLevel::ManualOnly);
        let disposition = pipeline.process_claim(claim(50.0), &inputs());
        match disposition {
            ClaimDisposition::Published(report) => {
                assert_eq!(report.recommendation, crate::core::report::Recommendation::ManualReview);
                assert_eq!(report.assigned_queue, Some(ReviewQueue::StandardReview));
            }
            ClaimDisposition::Parked { reason, .. } => panic!("expected publication, got parked: {reason}"),
        }
    }

    #[test]
    fn emergency_degradation_suppresses_publish() {
        let pipeline = ClaimPipeline::new(
            rule_store_with_one_passing_rule(),
            StubAudit::new(),
            NeutralMlEngine,
            StubPublisher::new(),
            NullJournal,
            PipelineConfig::default(),
        );
        pipeline.degradation().update(crate::runtime::degradation::DegradationLevel::Emergency);
        let disposition = pipeline.process_claim(claim(50.0), &inputs());
        match disposition {
            ClaimDisposition::Parked { reason, .. } => assert!(reason.contains("suppressed")),
            ClaimDisposition::Published(_) => panic!("expected parked under emergency degradation"),
        }
    }

    #[test]
    fn rules_only_auto_approves_small_amount_and_defers_large() {
        let small = ClaimPipeline::new(
            rule_store_with_one_passing_rule(),
            StubAudit::new(),
            NeutralMlEngine,
            StubPublisher::new(),
            NullJournal,
            PipelineConfig::default(),
        );
        small.degradation().update(crate::runtime::degradation::DegradationLevel::RulesOnly);
        match small.process_claim(claim(120.0), &inputs()) {
            ClaimDisposition::Published(report) => {
                assert_eq!(report.recommendation, crate::core::report::Recommendation::AutoApprove);
            }
            ClaimDisposition::Parked { reason, .. } => panic!("expected publication, got parked: {reason}"),
        }

        let large = ClaimPipeline::new(
            rule_store_with_one_passing_rule(),
            StubAudit::new(),
            NeutralMlEngine,
            StubPublisher::new(),
            NullJournal,
            PipelineConfig::default(),
        );
        large.degradation().update(crate::runtime::degradation::DegradationLevel::RulesOnly);
        match large.process_claim(claim(5_000.0), &inputs()) {
            ClaimDisposition::Published(report) => {
                assert_eq!(report.recommendation, crate::core::report::Recommendation::ManualReview);
            }
            ClaimDisposition::Parked { reason, .. } => panic!("expected publication, got parked: {reason}"),
        }
        let _ = FailingMlScorer;
    }
}

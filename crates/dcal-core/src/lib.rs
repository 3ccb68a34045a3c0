// crates/dcal-core/src/lib.rs
// ============================================================================
// Module: DCAL Core Library
// Description: Public API surface for the Dynamic Claims Automation Layer
//              core.
// Purpose: Expose the claim data model, the backend-agnostic runtime
//          interfaces, and the stateful pipeline stages.
// Dependencies: crate::{core, diagnostics, interfaces, runtime}
// ============================================================================

//! ## Overview
//! DCAL core provides deterministic rule evaluation, ML result aggregation,
//! decision synthesis, and tamper-evident audit recording for healthcare
//! claims. It is backend-agnostic and integrates through the traits in
//! [`interfaces`] rather than embedding a concrete store, broker, or model
//! host.

#![warn(missing_docs)]

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod diagnostics;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::audit::AuditRecord;
pub use core::audit::GENESIS_HASH;
pub use core::audit::ReportSnapshot;
pub use core::claim::Claim;
pub use core::claim::ClaimContext;
pub use core::claim::ClaimFields;
pub use core::claim::ClaimType;
pub use core::claim::ClaimValidationError;
pub use core::claim::CodeType;
pub use core::claim::DiagnosisCode;
pub use core::claim::ProcedureCode;
pub use core::identifiers::AnalysisId;
pub use core::identifiers::ClaimId;
pub use core::identifiers::CorrelationId;
pub use core::identifiers::FeedbackId;
pub use core::identifiers::ModelId;
pub use core::identifiers::PolicyId;
pub use core::identifiers::ProviderId;
pub use core::identifiers::ReviewId;
pub use core::identifiers::RuleId;
pub use core::ml::MLEngineResult;
pub use core::ml::ModelResult;
pub use core::ml::aggregate_model_results;
pub use core::report::IntelligenceReport;
pub use core::report::Priority;
pub use core::report::Recommendation;
pub use core::report::RelatedClaim;
pub use core::report::ReviewQueue;
pub use core::report::RiskIndicator;
pub use core::rule::AggregateOutcome;
pub use core::rule::RuleCategory;
pub use core::rule::RuleDefinition;
pub use core::rule::RuleEngineResult;
pub use core::rule::RuleOutcome;
pub use core::rule::RuleResult;
pub use core::rule::Ruleset;
pub use core::rule::RulesetStatus;
pub use core::rule::Severity;
pub use core::trace::DecisionEntry;
pub use core::trace::DecisionTrace;
pub use core::trace::StageMarker;
pub use core::trace::TraceError;
pub use diagnostics::FileJournal;
pub use diagnostics::JournalLevel;
pub use diagnostics::JournalRecord;
pub use diagnostics::JournalWriter;
pub use diagnostics::NullJournal;
pub use interfaces::AuditError;
pub use interfaces::AuditSink;
pub use interfaces::MlEngine;
pub use interfaces::MlScorer;
pub use interfaces::PublishError;
pub use interfaces::ReportPublisher;
pub use interfaces::ScorerError;
pub use runtime::breaker::BreakerConfig;
pub use runtime::breaker::BreakerState;
pub use runtime::breaker::CallPermit;
pub use runtime::breaker::CircuitBreaker;
pub use runtime::degradation::DegradationLevel;
pub use runtime::degradation::DegradationState;
pub use runtime::degradation::HealthSnapshot;
pub use runtime::executors::ExecutorPlan;
pub use runtime::executors::select_executor;
pub use runtime::pipeline::ClaimAnalysisInputs;
pub use runtime::pipeline::ClaimDisposition;
pub use runtime::pipeline::ClaimPipeline;
pub use runtime::pipeline::PipelineBudgets;
pub use runtime::pipeline::PipelineConfig;
pub use runtime::queue_router::QueueCapacity;
pub use runtime::queue_router::resolve_queue;
pub use runtime::queue_router::sla_hours;
pub use runtime::rule_engine::evaluate_rules;
pub use runtime::rule_store::RuleSnapshot;
pub use runtime::rule_store::RuleStore;
pub use runtime::synthesizer::SynthesisThresholds;
pub use runtime::synthesizer::synthesize;

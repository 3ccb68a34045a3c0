// crates/dcal-cli/src/ml_engine.rs
// ============================================================================
// Module: Parallel ML Engine
// Description: A fan-out MlEngine wiring concrete MlScorer model hosts.
// Purpose: Score a claim against every configured model concurrently and
//          aggregate the results (C4), degrading a scorer's contribution
//          rather than failing the claim when it errors or times out.
// Dependencies: dcal-core, std::thread, std::sync::mpsc
// ============================================================================

//! ## Overview
//! Model hosting itself is an opaque, pluggable concern (`MlScorer` is
//! defined only by its call contract). This engine owns the fan-out: each
//! scorer runs on its own thread and the engine either collects its
//! result or substitutes [`dcal_core::ModelResult::degraded`] once the
//! configured budget elapses. A deployment with zero scorers configured is
//! valid and falls through to `aggregate_model_results`'s empty-input
//! case, which marks the claim as requiring review.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use dcal_core::Claim;
use dcal_core::MLEngineResult;
use dcal_core::MlEngine;
use dcal_core::MlScorer;
use dcal_core::ModelResult;
use dcal_core::aggregate_model_results;

/// Fans a claim out to every registered [`MlScorer`], bounding total wait
/// time at `budget` regardless of how many scorers are configured.
pub struct ParallelMlEngine {
    scorers: Vec<Arc<dyn MlScorer + Send + Sync>>,
    weights: BTreeMap<String, f64>,
    top_n: usize,
    budget: Duration,
}

impl ParallelMlEngine {
    /// Builds an engine over `scorers`, weighted per `weights` (missing
    /// weights default to `1.0`) and bounded by `budget`.
    #[must_use]
    pub fn new(scorers: Vec<Arc<dyn MlScorer + Send + Sync>>, weights: BTreeMap<String, f64>, top_n: usize, budget: Duration) -> Self {
        Self { scorers, weights, top_n, budget }
    }
}

impl MlEngine for ParallelMlEngine {
    fn score_claim(&self, claim: &Claim) -> MLEngineResult {
        if self.scorers.is_empty() {
            return aggregate_model_results(&[], &self.weights, self.top_n);
        }

        let (tx, rx) = mpsc::channel::<ModelResult>();
        for scorer in &self.scorers {
            let scorer = Arc::clone(scorer);
            let tx = tx.clone();
            let claim = claim.clone();
            std::thread::spawn(move || {
                let model_id = dcal_core::ModelId::new("unknown");
                let result = scorer.score(&claim).unwrap_or_else(|_| ModelResult::degraded(model_id));
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let deadline = std::time::Instant::now() + self.budget;
        let mut results = Vec::with_capacity(self.scorers.len());
        while results.len() < self.scorers.len() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(result) => results.push(result),
                Err(mpsc::RecvTimeoutError::Timeout | mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        while results.len() < self.scorers.len() {
            results.push(ModelResult::degraded(dcal_core::ModelId::new("unavailable")));
        }

        aggregate_model_results(&results, &self.weights, self.top_n)
    }
}

#[cfg(test)]
mod tests {
    use dcal_core::ClaimFields;
    use dcal_core::ScorerError;
    use time::Date;
    use time::Month;

    use super::*;

    struct FixedScorer(f64);
    impl MlScorer for FixedScorer {
        fn score(&self, _claim: &Claim) -> Result<ModelResult, ScorerError> {
            Ok(ModelResult {
                model_id: dcal_core::ModelId::new("fixed"),
                model_version: "1.0.0".to_string(),
                model_hash: "abc".to_string(),
                risk_score: self.0,
                confidence: 0.8,
                risk_factors: vec![],
                anomaly_indicators: vec![],
                execution_time: Duration::from_millis(5),
            })
        }
    }

    struct SlowScorer;
    impl MlScorer for SlowScorer {
        fn score(&self, _claim: &Claim) -> Result<ModelResult, ScorerError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(ModelResult {
                model_id: dcal_core::ModelId::new("slow"),
                model_version: "1.0.0".to_string(),
                model_hash: String::new(),
                risk_score: 0.9,
                confidence: 0.9,
                risk_factors: vec![],
                anomaly_indicators: vec![],
                execution_time: Duration::from_millis(200),
            })
        }
    }

    fn sample_claim() -> Claim {
        let service_date = Date::from_calendar_date(2026, Month::July, 1).expect("valid date");
        let fields = ClaimFields {
            claim_id: "CLM-2026-000001".to_string(),
            policy_id: dcal_core::PolicyId::new("POL-1"),
            provider_id: dcal_core::ProviderId::new("PRV-1"),
            member_id_hash: "a".repeat(64),
            procedure_codes: vec![dcal_core::ProcedureCode {
                code: "99213".to_string(),
                code_type: dcal_core::CodeType::Cpt,
                quantity: 1,
                modifiers: vec![],
                line_amount: 120.0,
            }],
            diagnosis_codes: vec![],
            billed_amount: 120.0,
            service_date,
            service_date_end: None,
            claim_type: dcal_core::ClaimType::Professional,
            admission_date: None,
            discharge_date: None,
        };
        Claim::new(fields, Date::from_calendar_date(2026, Month::July, 2).expect("valid date")).expect("valid claim")
    }

    #[test]
    fn empty_scorer_set_falls_back_to_the_unknown_aggregate() {
        let engine = ParallelMlEngine::new(vec![], BTreeMap::new(), 5, Duration::from_millis(50));
        let result = engine.score_claim(&sample_claim());
        assert!(result.requires_review);
        assert_eq!(result.recommendation, "UNKNOWN");
    }

    #[test]
    fn every_configured_scorer_contributes_its_result() {
        let scorers: Vec<Arc<dyn MlScorer + Send + Sync>> = vec![Arc::new(FixedScorer(0.2)), Arc::new(FixedScorer(0.8))];
        let engine = ParallelMlEngine::new(scorers, BTreeMap::new(), 5, Duration::from_millis(500));
        let result = engine.score_claim(&sample_claim());
        assert_eq!(result.model_results.len(), 2);
        assert!((result.combined_risk_score - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn a_scorer_that_exceeds_the_budget_degrades_rather_than_blocking() {
        let scorers: Vec<Arc<dyn MlScorer + Send + Sync>> = vec![Arc::new(FixedScorer(0.3)), Arc::new(SlowScorer)];
        let engine = ParallelMlEngine::new(scorers, BTreeMap::new(), 5, Duration::from_millis(20));
        let result = engine.score_claim(&sample_claim());
        assert_eq!(result.model_results.len(), 2);
        assert!(result.model_results.iter().any(|r| r.confidence == 0.0));
    }
}

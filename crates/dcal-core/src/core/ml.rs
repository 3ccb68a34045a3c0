// crates/dcal-core/src/core/ml.rs
// ============================================================================
// Module: ML Result Model
// Description: Opaque per-model scorer results and the aggregated engine
//              result consumed by the decision synthesizer.
// Purpose: Treat model internals as a black box; define only how their
//          outputs are aggregated.
// Dependencies: serde, std::time::Duration, crate::core::identifiers
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ModelId;

/// A named, signed contributing risk factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Feature/factor name.
    pub name: String,
    /// Signed contribution to the risk score.
    pub contribution: f64,
}

/// A single model's scoring output.
///
/// # Invariants
/// - `risk_score` and `confidence` are each clamped to `[0, 1]` by the
///   scorer implementation before being returned here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    /// The model that produced this result.
    pub model_id: ModelId,
    /// The model's version string.
    pub model_version: String,
    /// Hash identifying the exact model artifact.
    pub model_hash: String,
    /// Risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Confidence in `[0, 1]`; `0` when degraded.
    pub confidence: f64,
    /// Contributing risk factors.
    pub risk_factors: Vec<RiskFactor>,
    /// Anomaly indicator labels.
    pub anomaly_indicators: Vec<String>,
    /// Wall-clock scoring time.
    pub execution_time: Duration,
}

impl ModelResult {
    /// Builds a degraded result (`confidence = 0`, neutral `risk_score =
    /// 0.5`) for a scorer that was unhealthy, timed out, or was cancelled
    /// due to budget exhaustion.
    #[must_use]
    pub fn degraded(model_id: ModelId) -> Self {
        Self {
            model_id,
            model_version: "unavailable".to_string(),
            model_hash: String::new(),
            risk_score: 0.5,
            confidence: 0.0,
            risk_factors: Vec::new(),
            anomaly_indicators: Vec::new(),
            execution_time: Duration::ZERO,
        }
    }
}

/// The ML Scorer Interface's aggregated result across all configured
/// models for one claim. Treated as an opaque contract by the rest of the
/// pipeline: this spec does not define how models compute scores, only how
/// the synthesizer consumes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MLEngineResult {
    /// Worst-case (max) risk score across models, in `[0, 1]`.
    pub combined_risk_score: f64,
    /// Weighted-mean confidence across models, clamped to `[0, 1]`.
    pub combined_confidence: f64,
    /// Advisory recommendation from the ML layer (not authoritative).
    pub recommendation: String,
    /// Per-model results.
    pub model_results: Vec<ModelResult>,
    /// Union of top risk factors, deduplicated by name, sorted by absolute
    /// contribution descending, truncated to the configured top-N.
    pub top_risk_factors: Vec<RiskFactor>,
    /// Anomaly summary labels across all models.
    pub anomaly_summary: Vec<String>,
    /// Whether any model flagged that the claim requires review regardless
    /// of score.
    pub requires_review: bool,
}

/// Aggregates per-model results per the ML Scorer Interface contract:
/// `combined_risk_score` is the max across models; `combined_confidence` is
/// the weighted mean by `weights` (missing/zero-sum weights fall back to an
/// unweighted mean), clamped to `[0, 1]`; `top_risk_factors` is the union
/// deduplicated by name, sorted by absolute contribution, truncated to
/// `top_n`.
#[must_use]
pub fn aggregate_model_results(
    results: &[ModelResult],
    weights: &std::collections::BTreeMap<String, f64>,
    top_n: usize,
) -> MLEngineResult {
    if results.is_empty() {
        return MLEngineResult {
            combined_risk_score: 0.5,
            combined_confidence: 0.0,
            recommendation: "UNKNOWN".to_string(),
            model_results: Vec::new(),
            top_risk_factors: Vec::new(),
            anomaly_summary: Vec::new(),
            requires_review: true,
        };
    }

    let combined_risk_score =
        results.iter().map(|r| r.risk_score).fold(f64::MIN, f64::max).clamp(0.0, 1.0);

    let weight_sum: f64 = results
        .iter()
        .map(|r| *weights.get(r.model_id.as_str()).unwrap_or(&1.0))
        .sum();
    let combined_confidence = if weight_sum > 0.0 {
        let weighted: f64 = results
            .iter()
            .map(|r| r.confidence * *weights.get(r.model_id.as_str()).unwrap_or(&1.0))
            .sum();
        (weighted / weight_sum).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut factor_map: std::collections::BTreeMap<String, f64> = std::collections::BTreeMap::new();
    for result in results {
        for factor in &result.risk_factors {
            let entry = factor_map.entry(factor.name.clone()).or_insert(0.0);
            if factor.contribution.abs() > entry.abs() {
                *entry = factor.contribution;
            }
        }
    }
    let mut top_risk_factors: Vec<RiskFactor> =
        factor_map.into_iter().map(|(name, contribution)| RiskFactor { name, contribution }).collect();
    top_risk_factors.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    top_risk_factors.truncate(top_n);

    let mut anomaly_summary: Vec<String> =
        results.iter().flat_map(|r| r.anomaly_indicators.iter().cloned()).collect();
    anomaly_summary.sort();
    anomaly_summary.dedup();

    let requires_review = results.iter().any(|r| r.confidence == 0.0);

    MLEngineResult {
        combined_risk_score,
        combined_confidence,
        recommendation: recommendation_label(combined_risk_score),
        model_results: results.to_vec(),
        top_risk_factors,
        anomaly_summary,
        requires_review,
    }
}

fn recommendation_label(risk_score: f64) -> String {
    if risk_score >= 0.70 {
        "HIGH_RISK".to_string()
    } else if risk_score >= 0.50 {
        "MEDIUM_RISK".to_string()
    } else if risk_score >= 0.30 {
        "LOW_RISK".to_string()
    } else {
        "MINIMAL_RISK".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_risk_is_worst_case() {
        let results = vec![
            ModelResult { risk_score: 0.2, ..ModelResult::degraded(ModelId::from("m1")) },
            ModelResult { risk_score: 0.8, confidence: 0.9, ..ModelResult::degraded(ModelId::from("m2")) },
        ];
        let aggregate = aggregate_model_results(&results, &std::collections::BTreeMap::new(), 10);
        assert_eq!(aggregate.combined_risk_score, 0.8);
    }

    #[test]
    fn missing_scorer_contributes_zero_confidence() {
        let results = vec![ModelResult::degraded(ModelId::from("m1"))];
        let aggregate = aggregate_model_results(&results, &std::collections::BTreeMap::new(), 10);
        assert!(aggregate.requires_review);
    }
}

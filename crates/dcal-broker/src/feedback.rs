// crates/dcal-broker/src/feedback.rs
// ============================================================================
// Module: Review Feedback Derivation
// Description: Turns a human review-portal decision into a derived
//              `claims.feedback` event for the training-data sink.
// Purpose: Close the loop between the pipeline's recommendation and the
//          reviewer's eventual disposition without the core depending on
//          the portal in any other way.
// Dependencies: dcal-core, serde, uuid
// ============================================================================

//! ## Overview
//! The core does not act on `claims.reviewed` beyond this derivation (spec
//! §6): it consumes the reviewer's decision, compares it against the
//! recommendation it originally produced, and emits a `claims.feedback`
//! event to a training-data sink. Nothing about scoring, rules, or queue
//! routing reacts to this event.

use serde::Deserialize;
use serde::Serialize;

use dcal_core::AnalysisId;
use dcal_core::FeedbackId;
use dcal_core::Recommendation;
use dcal_core::ReviewId;

/// A human reviewer's decision on a previously analyzed claim, as received
/// on the `claims.reviewed` topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDecisionEvent {
    /// The analysis this decision resolves.
    pub analysis_id: AnalysisId,
    /// Opaque identifier for the review itself.
    pub review_id: ReviewId,
    /// The reviewer's disposition.
    pub decision: ReviewDecision,
    /// Adjusted payable amount, when the reviewer changed it.
    #[serde(default)]
    pub decision_amount: Option<f64>,
    /// Free-text reason for an amount adjustment.
    #[serde(default)]
    pub adjustment_reason: Option<String>,
    /// Identifier of the user who made the decision.
    pub reviewer_user_id: String,
    /// The reviewer's role, e.g. `"senior_reviewer"`.
    pub reviewer_role: String,
    /// Signature over the event, verified the same way as inbound claims.
    pub signature: String,
}

/// A reviewer's disposition on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewDecision {
    /// The claim is approved as submitted.
    Approve,
    /// The claim is declined.
    Decline,
    /// The claim is escalated to a higher review tier.
    Escalate,
    /// More information is required before a decision can be made.
    RequestInfo,
}

/// Classifies how a reviewer's decision relates to the pipeline's original
/// recommendation, per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackType {
    /// The reviewer confirmed the pipeline's recommendation.
    CorrectPrediction,
    /// The pipeline flagged a claim the reviewer approved.
    FalsePositive,
    /// The pipeline cleared a claim the reviewer declined.
    FalseNegative,
    /// The reviewer partially agreed, e.g. approved at an adjusted amount.
    PartialAgreement,
    /// The reviewer overrode a rule-driven recommendation.
    RuleOverride,
    /// The reviewer overrode an ML-driven recommendation.
    MlOverride,
}

/// The reviewer's final determination, used to build training labels.
#[derive(Debug, Clone, Serialize)]
pub struct GroundTruth {
    /// The reviewer's decision, as a label.
    pub final_decision: String,
    /// Whether the reviewer determined the claim to be fraudulent.
    pub is_fraudulent: bool,
    /// Free-text fraud category, when known.
    pub fraud_type: Option<String>,
    /// Reviewer confidence, currently always `1.0` since this is a human
    /// determination rather than a model score.
    pub confidence: f64,
}

/// A derived feedback event, written to a training-data sink only; the
/// core takes no further action on it.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackEvent {
    /// Unique identifier for this feedback record.
    pub feedback_id: FeedbackId,
    /// The analysis this feedback resolves.
    pub analysis_id: AnalysisId,
    /// How the decision relates to the original recommendation.
    pub feedback_type: FeedbackType,
    /// The reviewer's final determination.
    pub ground_truth: GroundTruth,
}

/// Derives a `claims.feedback` event from a review decision and the
/// recommendation the pipeline originally produced for that analysis.
#[must_use]
pub fn derive_feedback(original: Recommendation, review: &ReviewDecisionEvent) -> FeedbackEvent {
    let feedback_type = classify(original, review.decision, review.decision_amount.is_some());
    let is_fraudulent = matches!(review.decision, ReviewDecision::Decline);

    FeedbackEvent {
        feedback_id: FeedbackId::new(uuid::Uuid::new_v4().to_string()),
        analysis_id: review.analysis_id,
        feedback_type,
        ground_truth: GroundTruth {
            final_decision: decision_label(review.decision).to_string(),
            is_fraudulent,
            fraud_type: review.adjustment_reason.clone().filter(|_| is_fraudulent),
            confidence: 1.0,
        },
    }
}

const fn decision_label(decision: ReviewDecision) -> &'static str {
    match decision {
        ReviewDecision::Approve => "APPROVE",
        ReviewDecision::Decline => "DECLINE",
        ReviewDecision::Escalate => "ESCALATE",
        ReviewDecision::RequestInfo => "REQUEST_INFO",
    }
}

fn classify(original: Recommendation, decision: ReviewDecision, amount_adjusted: bool) -> FeedbackType {
    match (original, decision) {
        (Recommendation::AutoApprove, ReviewDecision::Approve) | (Recommendation::AutoDecline, ReviewDecision::Decline) => {
            FeedbackType::CorrectPrediction
        }
        (Recommendation::AutoApprove, ReviewDecision::Decline) => FeedbackType::FalseNegative,
        (Recommendation::AutoDecline, ReviewDecision::Approve) => FeedbackType::FalsePositive,
        (Recommendation::ManualReview, ReviewDecision::Approve) if amount_adjusted => FeedbackType::PartialAgreement,
        (Recommendation::ManualReview, _) => FeedbackType::RuleOverride,
        _ => FeedbackType::MlOverride,
    }
}

/// A training-data sink a derived feedback event is written to.
pub trait FeedbackSink: Send + Sync {
    /// Records one feedback event.
    ///
    /// # Errors
    /// Returns an error string when the event could not be written.
    fn record(&self, event: &FeedbackEvent) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(decision: ReviewDecision, decision_amount: Option<f64>) -> ReviewDecisionEvent {
        ReviewDecisionEvent {
            analysis_id: AnalysisId::new(),
            review_id: ReviewId::new("REV-1"),
            decision,
            decision_amount,
            adjustment_reason: None,
            reviewer_user_id: "U-1".to_string(),
            reviewer_role: "senior_reviewer".to_string(),
            signature: "deadbeef".to_string(),
        }
    }

    #[test]
    fn reviewer_confirming_an_auto_approval_is_a_correct_prediction() {
        let event = derive_feedback(Recommendation::AutoApprove, &review(ReviewDecision::Approve, None));
        assert_eq!(event.feedback_type, FeedbackType::CorrectPrediction);
        assert!(!event.ground_truth.is_fraudulent);
    }

    #[test]
    fn reviewer_declining_an_auto_approval_is_a_false_negative() {
        let event = derive_feedback(Recommendation::AutoApprove, &review(ReviewDecision::Decline, None));
        assert_eq!(event.feedback_type, FeedbackType::FalseNegative);
        assert!(event.ground_truth.is_fraudulent);
    }

    #[test]
    fn reviewer_approving_an_auto_decline_is_a_false_positive() {
        let event = derive_feedback(Recommendation::AutoDecline, &review(ReviewDecision::Approve, None));
        assert_eq!(event.feedback_type, FeedbackType::FalsePositive);
    }

    #[test]
    fn adjusted_approval_out_of_manual_review_is_partial_agreement() {
        let event = derive_feedback(Recommendation::ManualReview, &review(ReviewDecision::Approve, Some(50.0)));
        assert_eq!(event.feedback_type, FeedbackType::PartialAgreement);
    }

    #[test]
    fn escalation_out_of_manual_review_is_a_rule_override() {
        let event = derive_feedback(Recommendation::ManualReview, &review(ReviewDecision::Escalate, None));
        assert_eq!(event.feedback_type, FeedbackType::RuleOverride);
    }
}

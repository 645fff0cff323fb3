//! Eligibility Filter: which operators are allowed to see and bid on a job.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::common::{OperatorId, Settings};

/// An operator as consumed from the onboarding/approval system. Only the
/// fields the filter needs are modeled here; the rest of the operator
/// record is owned elsewhere.
#[derive(Debug, Clone)]
pub struct OperatorProfile {
    pub id: OperatorId,
    pub approval_status: ApprovalStatus,
    pub service_areas: Vec<String>,
    pub vehicle_types: Vec<String>,
    pub documents: Vec<OperatorDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Approved,
    Pending,
    Rejected,
    Suspended,
}

#[derive(Debug, Clone)]
pub struct OperatorDocument {
    pub doc_type: DocumentType,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    OperatingLicense,
    Insurance,
    Other,
}

/// The job-side facts the filter checks against.
#[derive(Debug, Clone)]
pub struct JobEligibilityContext {
    pub required_vehicle_type: String,
    pub pickup_postcode_prefix: String,
}

/// A single rule's verdict on a single operator, used for the debug trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EligibilityDecision {
    Eligible,
    RejectedNotApproved,
    RejectedVehicleTypeUnsupported,
    RejectedDocumentsMissingOrExpired,
    RejectedPostcodeMismatch,
}

/// Evaluates rules (1)-(3): approval, vehicle type, document currency.
/// Shared by the broadcast-time full evaluation and the bid-submission
/// re-check, which per spec.md §4.2 only re-runs these three, not the
/// postcode rule.
fn evaluate_approval_vehicle_documents(
    operator: &OperatorProfile,
    job: &JobEligibilityContext,
) -> EligibilityDecision {
    if operator.approval_status != ApprovalStatus::Approved {
        tracing::debug!(operator_id = %operator.id, "rejected: not approved");
        return EligibilityDecision::RejectedNotApproved;
    }

    if !operator
        .vehicle_types
        .iter()
        .any(|v| v == &job.required_vehicle_type)
    {
        tracing::debug!(operator_id = %operator.id, "rejected: vehicle type unsupported");
        return EligibilityDecision::RejectedVehicleTypeUnsupported;
    }

    let now = Utc::now();
    let has_current = |doc_type: DocumentType| {
        operator.documents.iter().any(|d| {
            d.doc_type == doc_type && d.expires_at.map(|exp| exp > now).unwrap_or(true)
        })
    };
    if !has_current(DocumentType::OperatingLicense) || !has_current(DocumentType::Insurance) {
        tracing::debug!(operator_id = %operator.id, "rejected: documents missing or expired");
        return EligibilityDecision::RejectedDocumentsMissingOrExpired;
    }

    EligibilityDecision::Eligible
}

/// Evaluates all four rules for one operator against one job. Used for the
/// broadcast-time candidate filter (spec.md §4.2).
pub fn evaluate(
    operator: &OperatorProfile,
    job: &JobEligibilityContext,
    settings: &Settings,
) -> EligibilityDecision {
    let decision = evaluate_approval_vehicle_documents(operator, job);
    if !matches!(decision, EligibilityDecision::Eligible) {
        return decision;
    }

    if settings.enable_postcode_filtering {
        let matches = operator
            .service_areas
            .iter()
            .any(|prefix| prefix == &job.pickup_postcode_prefix);
        if !matches {
            tracing::debug!(operator_id = %operator.id, "rejected: postcode mismatch");
            return EligibilityDecision::RejectedPostcodeMismatch;
        }
    }

    EligibilityDecision::Eligible
}

/// Re-checks only rules (1)-(3) at bid-submission time (spec.md §4.2: "Rule
/// (1)-(3) are re-checked at bid-submission time [...] because an operator
/// may become ineligible after broadcast"). The postcode rule is broadcast
/// eligibility only and is deliberately not re-applied here.
pub fn evaluate_for_bid_submission(
    operator: &OperatorProfile,
    job: &JobEligibilityContext,
) -> EligibilityDecision {
    evaluate_approval_vehicle_documents(operator, job)
}

/// Filters a candidate list down to eligible operators, logging every
/// rejection reason so "why wasn't operator X broadcast to" is answerable
/// from logs.
pub fn filter_eligible(
    operators: &[OperatorProfile],
    job: &JobEligibilityContext,
    settings: &Settings,
) -> Vec<OperatorId> {
    operators
        .iter()
        .filter_map(|op| match evaluate(op, job, settings) {
            EligibilityDecision::Eligible => Some(op.id),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approved_operator() -> OperatorProfile {
        OperatorProfile {
            id: OperatorId::new(),
            approval_status: ApprovalStatus::Approved,
            service_areas: vec!["SW1".to_string()],
            vehicle_types: vec!["saloon".to_string()],
            documents: vec![
                OperatorDocument {
                    doc_type: DocumentType::OperatingLicense,
                    expires_at: None,
                },
                OperatorDocument {
                    doc_type: DocumentType::Insurance,
                    expires_at: Some(Utc::now() + chrono::Duration::days(30)),
                },
            ],
        }
    }

    fn job_ctx() -> JobEligibilityContext {
        JobEligibilityContext {
            required_vehicle_type: "saloon".to_string(),
            pickup_postcode_prefix: "SW1".to_string(),
        }
    }

    #[test]
    fn approved_operator_with_current_docs_and_matching_area_is_eligible() {
        let settings = Settings::from_env();
        let decision = evaluate(&approved_operator(), &job_ctx(), &settings);
        assert!(matches!(decision, EligibilityDecision::Eligible));
    }

    #[test]
    fn unapproved_operator_is_rejected() {
        let mut op = approved_operator();
        op.approval_status = ApprovalStatus::Pending;
        let settings = Settings::from_env();
        let decision = evaluate(&op, &job_ctx(), &settings);
        assert!(matches!(decision, EligibilityDecision::RejectedNotApproved));
    }

    #[test]
    fn expired_insurance_is_rejected() {
        let mut op = approved_operator();
        op.documents[1].expires_at = Some(Utc::now() - chrono::Duration::days(1));
        let settings = Settings::from_env();
        let decision = evaluate(&op, &job_ctx(), &settings);
        assert!(matches!(
            decision,
            EligibilityDecision::RejectedDocumentsMissingOrExpired
        ));
    }

    #[test]
    fn mismatched_vehicle_type_is_rejected() {
        let mut op = approved_operator();
        op.vehicle_types = vec!["minibus".to_string()];
        let settings = Settings::from_env();
        let decision = evaluate(&op, &job_ctx(), &settings);
        assert!(matches!(
            decision,
            EligibilityDecision::RejectedVehicleTypeUnsupported
        ));
    }

    #[test]
    fn postcode_mismatch_rejected_only_when_filtering_enabled() {
        let mut op = approved_operator();
        op.service_areas = vec!["E1".to_string()];
        let mut settings = Settings::from_env();
        settings.enable_postcode_filtering = true;
        assert!(matches!(
            evaluate(&op, &job_ctx(), &settings),
            EligibilityDecision::RejectedPostcodeMismatch
        ));

        settings.enable_postcode_filtering = false;
        assert!(matches!(
            evaluate(&op, &job_ctx(), &settings),
            EligibilityDecision::Eligible
        ));
    }
}

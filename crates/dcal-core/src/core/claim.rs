// crates/dcal-core/src/core/claim.rs
// ============================================================================
// Module: Claim
// Description: The immutable claim input to the analysis pipeline.
// Purpose: Carry the field contracts from the claim-analysis data model and
//          a constructor that enforces them, so a `Claim` value is always
//          well-formed once built.
// Dependencies: serde, time, crate::core::identifiers
// ============================================================================

//! ## Overview
//! A `Claim` is immutable after construction: [`Claim::new`] is the only
//! entry point, and it enforces every field contract from the data model.
//! Core never sees raw member identity — only `member_id_hash`.

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use thiserror::Error;

use crate::core::identifiers::PolicyId;
use crate::core::identifiers::ProviderId;

/// Procedure/diagnosis code systems recognized by the claim model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeType {
    /// Current Procedural Terminology.
    Cpt,
    /// Healthcare Common Procedure Coding System.
    Hcpcs,
    /// ICD-10 Procedure Coding System.
    Icd10Pcs,
    /// Current Dental Terminology.
    Cdt,
    /// National Drug Code.
    Ndc,
}

/// Claim type, governing which optional fields apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    /// Professional (physician) claim.
    Professional,
    /// Institutional (facility) claim.
    Institutional,
    /// Dental claim.
    Dental,
    /// Pharmacy claim.
    Pharmacy,
    /// Vision claim.
    Vision,
}

/// A single billed procedure line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureCode {
    /// The procedure/service code.
    pub code: String,
    /// The coding system the code belongs to.
    pub code_type: CodeType,
    /// Units of service, in `[1, 999]`.
    pub quantity: u16,
    /// Up to four modifier codes.
    pub modifiers: Vec<String>,
    /// Billed amount for this line, non-negative.
    pub line_amount: f64,
}

/// A single diagnosis code, ordered by `sequence` (1 = primary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisCode {
    /// ICD-10-CM code.
    pub code: String,
    /// Position in the diagnosis list; 1 is primary.
    pub sequence: u8,
}

/// The immutable claim submitted for analysis.
///
/// # Invariants
/// - Constructed only via [`Claim::new`], which enforces every field
///   contract below; there is no public mutator.
/// - `procedure_codes` is non-empty and has at most 999 entries.
/// - `diagnosis_codes` has at most 25 entries, each matching the
///   ICD-10-CM pattern and ordered by `sequence` with `1` as primary.
/// - `billed_amount` is non-negative and at most `99_999_999.99`.
/// - `service_date` is not in the future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    claim_id: String,
    policy_id: PolicyId,
    provider_id: ProviderId,
    member_id_hash: String,
    procedure_codes: Vec<ProcedureCode>,
    diagnosis_codes: Vec<DiagnosisCode>,
    billed_amount: f64,
    service_date: Date,
    service_date_end: Option<Date>,
    claim_type: ClaimType,
    admission_date: Option<Date>,
    discharge_date: Option<Date>,
}

/// Errors raised when constructing a [`Claim`] from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimValidationError {
    /// `claim_id` did not match `CLM-YYYY-<6..12 digits>`.
    #[error("invalid claim_id format: {0}")]
    InvalidClaimId(String),
    /// `member_id_hash` was not 64 lowercase hex characters.
    #[error("member_id_hash must be 64 lowercase hex characters")]
    InvalidMemberIdHash,
    /// `procedure_codes` was empty or exceeded 999 entries.
    #[error("procedure_codes must contain between 1 and 999 entries, got {0}")]
    InvalidProcedureCodeCount(usize),
    /// A procedure line carried more than 4 modifiers.
    #[error("procedure code at index {0} has more than 4 modifiers")]
    TooManyModifiers(usize),
    /// A procedure line quantity was outside `[1, 999]`.
    #[error("procedure code at index {0} has quantity outside [1, 999]")]
    InvalidQuantity(usize),
    /// A procedure line amount was negative.
    #[error("procedure code at index {0} has a negative line_amount")]
    NegativeLineAmount(usize),
    /// `diagnosis_codes` exceeded 25 entries.
    #[error("diagnosis_codes must contain at most 25 entries, got {0}")]
    TooManyDiagnosisCodes(usize),
    /// A diagnosis code did not match the ICD-10-CM pattern.
    #[error("diagnosis code at index {0} does not match the ICD-10-CM pattern")]
    InvalidDiagnosisCode(usize),
    /// `diagnosis_codes` was not ordered by `sequence` with `1` as primary.
    #[error("diagnosis code at index {0} has an out-of-order sequence value")]
    InvalidDiagnosisSequence(usize),
    /// `billed_amount` was negative or exceeded the cap.
    #[error("billed_amount must be in [0, 99999999.99], got {0}")]
    InvalidBilledAmount(f64),
    /// `service_date` was in the future.
    #[error("service_date must not be in the future")]
    FutureServiceDate,
    /// `service_date_end` preceded `service_date`.
    #[error("service_date_end must not precede service_date")]
    InvalidServiceDateRange,
    /// Institutional admission/discharge ordering was violated.
    #[error("admission_date <= service_date <= discharge_date must hold for institutional claims")]
    InvalidInstitutionalDateRange,
}

/// Parameters accepted by [`Claim::new`], mirroring the field contracts of
/// the data model. Grouped into a struct so the constructor stays a single
/// readable call despite the field count.
#[derive(Debug, Clone)]
pub struct ClaimFields {
    /// See [`Claim`] field of the same name.
    pub claim_id: String,
    /// See [`Claim`] field of the same name.
    pub policy_id: PolicyId,
    /// See [`Claim`] field of the same name.
    pub provider_id: ProviderId,
    /// See [`Claim`] field of the same name.
    pub member_id_hash: String,
    /// See [`Claim`] field of the same name.
    pub procedure_codes: Vec<ProcedureCode>,
    /// See [`Claim`] field of the same name.
    pub diagnosis_codes: Vec<DiagnosisCode>,
    /// See [`Claim`] field of the same name.
    pub billed_amount: f64,
    /// See [`Claim`] field of the same name.
    pub service_date: Date,
    /// See [`Claim`] field of the same name.
    pub service_date_end: Option<Date>,
    /// See [`Claim`] field of the same name.
    pub claim_type: ClaimType,
    /// See [`Claim`] field of the same name.
    pub admission_date: Option<Date>,
    /// See [`Claim`] field of the same name.
    pub discharge_date: Option<Date>,
}

impl Claim {
    /// Builds and validates a claim, enforcing every field contract.
    ///
    /// # Errors
    /// Returns [`ClaimValidationError`] for the first contract violation
    /// found.
    pub fn new(fields: ClaimFields, today: Date) -> Result<Self, ClaimValidationError> {
        validate_claim_id(&fields.claim_id)?;
        validate_member_id_hash(&fields.member_id_hash)?;

        if fields.procedure_codes.is_empty() || fields.procedure_codes.len() > 999 {
            return Err(ClaimValidationError::InvalidProcedureCodeCount(fields.procedure_codes.len()));
        }
        for (idx, proc_code) in fields.procedure_codes.iter().enumerate() {
            if proc_code.modifiers.len() > 4 {
                return Err(ClaimValidationError::TooManyModifiers(idx));
            }
            if proc_code.quantity == 0 || proc_code.quantity > 999 {
                return Err(ClaimValidationError::InvalidQuantity(idx));
            }
            if proc_code.line_amount < 0.0 {
                return Err(ClaimValidationError::NegativeLineAmount(idx));
            }
        }

        if fields.diagnosis_codes.len() > 25 {
            return Err(ClaimValidationError::TooManyDiagnosisCodes(fields.diagnosis_codes.len()));
        }
        for (idx, diagnosis) in fields.diagnosis_codes.iter().enumerate() {
            if !is_icd10_cm_code(&diagnosis.code) {
                return Err(ClaimValidationError::InvalidDiagnosisCode(idx));
            }
            #[allow(clippy::cast_possible_truncation, reason = "diagnosis_codes is capped at 25 entries")]
            let expected_sequence = idx as u8 + 1;
            if diagnosis.sequence != expected_sequence {
                return Err(ClaimValidationError::InvalidDiagnosisSequence(idx));
            }
        }

        if fields.billed_amount < 0.0 || fields.billed_amount > 99_999_999.99 {
            return Err(ClaimValidationError::InvalidBilledAmount(fields.billed_amount));
        }

        if fields.service_date > today {
            return Err(ClaimValidationError::FutureServiceDate);
        }

        if let Some(end) = fields.service_date_end {
            if end < fields.service_date {
                return Err(ClaimValidationError::InvalidServiceDateRange);
            }
        }

        if matches!(fields.claim_type, ClaimType::Institutional) {
            if let (Some(admission), Some(discharge)) = (fields.admission_date, fields.discharge_date) {
                if !(admission <= fields.service_date && fields.service_date <= discharge) {
                    return Err(ClaimValidationError::InvalidInstitutionalDateRange);
                }
            }
        }

        Ok(Self {
            claim_id: fields.claim_id,
            policy_id: fields.policy_id,
            provider_id: fields.provider_id,
            member_id_hash: fields.member_id_hash,
            procedure_codes: fields.procedure_codes,
            diagnosis_codes: fields.diagnosis_codes,
            billed_amount: fields.billed_amount,
            service_date: fields.service_date,
            service_date_end: fields.service_date_end,
            claim_type: fields.claim_type,
            admission_date: fields.admission_date,
            discharge_date: fields.discharge_date,
        })
    }

    /// Returns the claim identifier.
    #[must_use]
    pub fn claim_id(&self) -> &str {
        &self.claim_id
    }

    /// Returns the policy identifier.
    #[must_use]
    pub const fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    /// Returns the provider identifier.
    #[must_use]
    pub const fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Returns the hashed member identifier.
    #[must_use]
    pub fn member_id_hash(&self) -> &str {
        &self.member_id_hash
    }

    /// Returns the procedure code lines.
    #[must_use]
    pub fn procedure_codes(&self) -> &[ProcedureCode] {
        &self.procedure_codes
    }

    /// Returns the diagnosis codes.
    #[must_use]
    pub fn diagnosis_codes(&self) -> &[DiagnosisCode] {
        &self.diagnosis_codes
    }

    /// Returns the total billed amount.
    #[must_use]
    pub const fn billed_amount(&self) -> f64 {
        self.billed_amount
    }

    /// Returns the service date.
    #[must_use]
    pub const fn service_date(&self) -> Date {
        self.service_date
    }

    /// Returns the claim type.
    #[must_use]
    pub const fn claim_type(&self) -> ClaimType {
        self.claim_type
    }
}

/// Read-only [`dcal_expr::Addressable`] view over a [`Claim`], exposing the
/// `claim.*` root to rule expressions. Other closed-set roots
/// (`policy`, `provider`, `member`, `history`, `tariff`) are recognized but
/// resolve to no attributes until a lookup source is wired in front of
/// this context.
pub struct ClaimContext<'a> {
    claim: &'a Claim,
}

impl<'a> ClaimContext<'a> {
    /// Wraps a claim for expression evaluation.
    #[must_use]
    pub const fn new(claim: &'a Claim) -> Self {
        Self { claim }
    }
}

impl dcal_expr::Addressable for ClaimContext<'_> {
    fn resolve(&self, root: &str, path: &[&str]) -> Option<dcal_expr::Value> {
        if root != "claim" {
            return None;
        }
        match path {
            ["billed_amount"] => Some(dcal_expr::Value::Float(self.claim.billed_amount())),
            ["service_date"] => Some(dcal_expr::Value::Date(self.claim.service_date())),
            ["claim_type"] => Some(dcal_expr::Value::Str(claim_type_label(self.claim.claim_type()).to_string())),
            ["claim_id"] => Some(dcal_expr::Value::Str(self.claim.claim_id().to_string())),
            ["policy_id"] => Some(dcal_expr::Value::Str(self.claim.policy_id().to_string())),
            ["provider_id"] => Some(dcal_expr::Value::Str(self.claim.provider_id().to_string())),
            ["procedure_code_count"] => {
                #[allow(clippy::cast_possible_wrap, reason = "procedure_codes is capped at 999 entries")]
                Some(dcal_expr::Value::Int(self.claim.procedure_codes().len() as i64))
            }
            ["diagnosis_code_count"] => {
                #[allow(clippy::cast_possible_wrap, reason = "diagnosis_codes is capped at 25 entries")]
                Some(dcal_expr::Value::Int(self.claim.diagnosis_codes().len() as i64))
            }
            _ => None,
        }
    }

    fn has_root(&self, root: &str) -> bool {
        matches!(root, "claim" | "policy" | "provider" | "member" | "history" | "tariff")
    }
}

const fn claim_type_label(claim_type: ClaimType) -> &'static str {
    match claim_type {
        ClaimType::Professional => "PROFESSIONAL",
        ClaimType::Institutional => "INSTITUTIONAL",
        ClaimType::Dental => "DENTAL",
        ClaimType::Pharmacy => "PHARMACY",
        ClaimType::Vision => "VISION",
    }
}

fn validate_claim_id(claim_id: &str) -> Result<(), ClaimValidationError> {
    let Some(rest) = claim_id.strip_prefix("CLM-") else {
        return Err(ClaimValidationError::InvalidClaimId(claim_id.to_string()));
    };
    let Some((year, digits)) = rest.split_once('-') else {
        return Err(ClaimValidationError::InvalidClaimId(claim_id.to_string()));
    };
    let year_valid = year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit());
    let digits_valid = (6 ..= 12).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());
    if year_valid && digits_valid {
        Ok(())
    } else {
        Err(ClaimValidationError::InvalidClaimId(claim_id.to_string()))
    }
}

fn validate_member_id_hash(hash: &str) -> Result<(), ClaimValidationError> {
    if hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_digit() || (b'a' ..= b'f').contains(&b)) {
        Ok(())
    } else {
        Err(ClaimValidationError::InvalidMemberIdHash)
    }
}

/// Checks a code against `^[A-TV-Z][0-9][0-9AB](\.[0-9A-Z]{1,4})?$`.
fn is_icd10_cm_code(code: &str) -> bool {
    code.find('.').map_or_else(
        || is_icd10_cm_head(code),
        |dot_idx| {
            let (head, rest) = code.split_at(dot_idx);
            let suffix = &rest[1 ..];
            is_icd10_cm_head(head) && (1 ..= 4).contains(&suffix.len()) && suffix.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
        },
    )
}

/// Checks the three-character category portion of an ICD-10-CM code.
fn is_icd10_cm_head(head: &str) -> bool {
    let bytes = head.as_bytes();
    bytes.len() == 3
        && bytes[0].is_ascii_uppercase()
        && bytes[0] != b'U'
        && bytes[1].is_ascii_digit()
        && (bytes[2].is_ascii_digit() || bytes[2] == b'A' || bytes[2] == b'B')
}

#[cfg(test)]
mod tests {
    use time::Month;

    use super::*;

    fn sample_fields(today: Date) -> ClaimFields {
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
                line_amount: 120.0,
            }],
            diagnosis_codes: vec![DiagnosisCode { code: "J06.9".to_string(), sequence: 1 }],
            billed_amount: 120.0,
            service_date: today.previous_day().expect("valid date"),
            service_date_end: None,
            claim_type: ClaimType::Professional,
            admission_date: None,
            discharge_date: None,
        }
    }

    fn today() -> Date {
        Date::from_calendar_date(2026, Month::July, 28).expect("valid date")
    }

    #[test]
    fn accepts_a_well_formed_claim() {
        let claim = Claim::new(sample_fields(today()), today()).expect("valid claim");
        assert_eq!(claim.billed_amount(), 120.0);
    }

    #[test]
    fn rejects_future_service_date() {
        let mut fields = sample_fields(today());
        fields.service_date = today().next_day().expect("valid date");
        let err = Claim::new(fields, today()).unwrap_err();
        assert_eq!(err, ClaimValidationError::FutureServiceDate);
    }

    #[test]
    fn rejects_malformed_claim_id() {
        let mut fields = sample_fields(today());
        fields.claim_id = "NOT-A-CLAIM".to_string();
        assert!(Claim::new(fields, today()).is_err());
    }

    #[test]
    fn rejects_diagnosis_code_not_matching_icd10_cm_pattern() {
        let mut fields = sample_fields(today());
        fields.diagnosis_codes = vec![DiagnosisCode { code: "not-an-icd".to_string(), sequence: 1 }];
        let err = Claim::new(fields, today()).unwrap_err();
        assert_eq!(err, ClaimValidationError::InvalidDiagnosisCode(0));
    }

    #[test]
    fn rejects_diagnosis_code_with_u_category_letter() {
        let mut fields = sample_fields(today());
        fields.diagnosis_codes = vec![DiagnosisCode { code: "U07.1".to_string(), sequence: 1 }];
        let err = Claim::new(fields, today()).unwrap_err();
        assert_eq!(err, ClaimValidationError::InvalidDiagnosisCode(0));
    }

    #[test]
    fn rejects_diagnosis_codes_out_of_sequence() {
        let mut fields = sample_fields(today());
        fields.diagnosis_codes = vec![DiagnosisCode { code: "J06.9".to_string(), sequence: 7 }];
        let err = Claim::new(fields, today()).unwrap_err();
        assert_eq!(err, ClaimValidationError::InvalidDiagnosisSequence(0));
    }

    #[test]
    fn accepts_multiple_diagnosis_codes_in_sequence_order() {
        let mut fields = sample_fields(today());
        fields.diagnosis_codes =
            vec![DiagnosisCode { code: "J06.9".to_string(), sequence: 1 }, DiagnosisCode { code: "E11.9".to_string(), sequence: 2 }];
        assert!(Claim::new(fields, today()).is_ok());
    }

    #[test]
    fn rejects_billed_amount_over_cap() {
        let mut fields = sample_fields(today());
        fields.billed_amount = 100_000_000.0;
        assert!(Claim::new(fields, today()).is_err());
    }

    #[test]
    fn accepts_exactly_the_amount_cap() {
        let mut fields = sample_fields(today());
        fields.billed_amount = 99_999_999.99;
        assert!(Claim::new(fields, today()).is_ok());
    }

    #[test]
    fn claim_context_resolves_billed_amount() {
        use dcal_expr::Addressable;
        let claim = Claim::new(sample_fields(today()), today()).expect("valid claim");
        let context = ClaimContext::new(&claim);
        assert_eq!(context.resolve("claim", &["billed_amount"]), Some(dcal_expr::Value::Float(120.0)));
        assert_eq!(context.resolve("policy", &["name"]), None);
        assert!(context.has_root("policy"));
        assert!(!context.has_root("unknown"));
    }
}

// crates/dcal-broker/src/envelope.rs
// ============================================================================
// Module: Inbound Claim Envelope
// Description: Wire envelope verification for the `claims.submitted` topic.
// Purpose: Verify HMAC signature, schema, and clock skew before a raw
//          message is allowed to become a `Claim`.
// Dependencies: dcal-core, serde, serde_json, serde_jcs, hmac, sha2, subtle,
//               time
// ============================================================================

//! ## Overview
//! `claims.submitted` envelopes carry a canonical-JSON payload signed with
//! HMAC-SHA256 over the `payload` object only. Verification happens in a
//! fixed order — signature, then schema, then clock skew — because a
//! forged envelope must never reach schema or skew checks where its
//! rejection reason would leak more about why it was rejected.

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use dcal_core::ClaimFields;
use dcal_core::ClaimType;
use dcal_core::CodeType;
use dcal_core::DiagnosisCode;
use dcal_core::PolicyId;
use dcal_core::ProcedureCode;
use dcal_core::ProviderId;

const ENVELOPE_VERSION: &str = "1.0.0";

/// Errors raised while verifying an inbound envelope. Every variant maps to
/// one of the outbound error-schema codes (spec §6).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// `envelope_version` did not match the version this build understands.
    #[error("schema version mismatch: got {0}")]
    SchemaVersionMismatch(String),
    /// A required field was missing or had the wrong shape.
    #[error("schema violation: {0}")]
    SchemaInvalid(String),
    /// The signature did not match the payload under the sender's key.
    #[error("signature invalid")]
    SignatureInvalid,
    /// The envelope timestamp fell outside the allowed clock skew.
    #[error("envelope timestamp outside allowed skew")]
    ReplayWindowViolation,
    /// The canonical-JSON encoding of the payload failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

/// Raw wire shape of the `claims.submitted` envelope, deserialized before
/// any trust decision is made about its contents.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    pub envelope_version: String,
    pub timestamp: String,
    pub signature: String,
    pub payload: serde_json::Value,
}

/// The claim fields as they appear on the wire, mirroring [`ClaimFields`]
/// but accepting untrusted JSON rather than already-validated types.
#[derive(Debug, Clone, Deserialize)]
pub struct WireClaimPayload {
    pub claim_id: String,
    pub policy_id: String,
    pub provider_id: String,
    pub member_id_hash: String,
    pub procedure_codes: Vec<WireProcedureCode>,
    #[serde(default)]
    pub diagnosis_codes: Vec<DiagnosisCode>,
    pub billed_amount: f64,
    pub service_date: time::Date,
    #[serde(default)]
    pub service_date_end: Option<time::Date>,
    pub claim_type: ClaimType,
    #[serde(default)]
    pub admission_date: Option<time::Date>,
    #[serde(default)]
    pub discharge_date: Option<time::Date>,
}

/// Wire shape of one procedure line.
#[derive(Debug, Clone, Deserialize)]
pub struct WireProcedureCode {
    pub code: String,
    pub code_type: CodeType,
    pub quantity: u16,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub line_amount: f64,
}

impl From<WireClaimPayload> for ClaimFields {
    fn from(wire: WireClaimPayload) -> Self {
        Self {
            claim_id: wire.claim_id,
            policy_id: PolicyId::from(wire.policy_id),
            provider_id: ProviderId::from(wire.provider_id),
            member_id_hash: wire.member_id_hash,
            procedure_codes: wire
                .procedure_codes
                .into_iter()
                .map(|p| ProcedureCode {
                    code: p.code,
                    code_type: p.code_type,
                    quantity: p.quantity,
                    modifiers: p.modifiers,
                    line_amount: p.line_amount,
                })
                .collect(),
            diagnosis_codes: wire.diagnosis_codes,
            billed_amount: wire.billed_amount,
            service_date: wire.service_date,
            service_date_end: wire.service_date_end,
            claim_type: wire.claim_type,
            admission_date: wire.admission_date,
            discharge_date: wire.discharge_date,
        }
    }
}

/// A verified envelope, ready to be handed to ingestion for idempotency
/// checking and claim construction.
#[derive(Debug, Clone)]
pub struct VerifiedEnvelope {
    /// RFC3339 envelope timestamp, already checked against skew.
    pub timestamp: String,
    /// SHA-256 hex digest of the canonical payload, used as the
    /// idempotency dedupe key alongside `claim_id`.
    pub envelope_hash: String,
    /// The still-untrusted claim payload; schema-shape checked but not yet
    /// passed through [`dcal_core::Claim::new`].
    pub claim: WireClaimPayload,
}

/// Verifies signature, schema, and clock skew for one raw envelope, in that
/// order.
///
/// # Errors
/// Returns [`EnvelopeError`] for the first failing check.
pub fn verify_envelope(raw: &RawEnvelope, signing_key: &[u8], max_skew_seconds: u64, now: OffsetDateTime) -> Result<VerifiedEnvelope, EnvelopeError> {
    if raw.envelope_version != ENVELOPE_VERSION {
        return Err(EnvelopeError::SchemaVersionMismatch(raw.envelope_version.clone()));
    }

    verify_signature(&raw.payload, &raw.signature, signing_key)?;

    let claim: WireClaimPayload =
        serde_json::from_value(raw.payload.clone()).map_err(|err| EnvelopeError::SchemaInvalid(err.to_string()))?;

    let envelope_time =
        OffsetDateTime::parse(&raw.timestamp, &Rfc3339).map_err(|err| EnvelopeError::SchemaInvalid(err.to_string()))?;
    let skew = (now - envelope_time).abs();
    if skew.whole_seconds().unsigned_abs() > max_skew_seconds {
        return Err(EnvelopeError::ReplayWindowViolation);
    }

    let envelope_hash = canonical_payload_hash(&raw.payload)?;

    Ok(VerifiedEnvelope { timestamp: raw.timestamp.clone(), envelope_hash, claim })
}

/// Verifies the envelope's HMAC-SHA256 signature over the canonical
/// payload, comparing digests in constant time.
fn verify_signature(payload: &serde_json::Value, signature_hex: &str, signing_key: &[u8]) -> Result<(), EnvelopeError> {
    let canonical = serde_jcs::to_string(payload).map_err(|err| EnvelopeError::Canonicalization(err.to_string()))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(signing_key).map_err(|err| EnvelopeError::Canonicalization(err.to_string()))?;
    mac.update(canonical.as_bytes());
    let expected = mac.finalize().into_bytes();

    let provided = decode_hex(signature_hex).ok_or(EnvelopeError::SignatureInvalid)?;
    if provided.len() != expected.len() || provided.ct_eq(expected.as_slice()).unwrap_u8() != 1 {
        return Err(EnvelopeError::SignatureInvalid);
    }
    Ok(())
}

/// Computes the SHA-256 hex digest of the canonical payload, used as half
/// of the idempotency key.
fn canonical_payload_hash(payload: &serde_json::Value) -> Result<String, EnvelopeError> {
    use sha2::Digest;
    let canonical = serde_jcs::to_string(payload).map_err(|err| EnvelopeError::Canonicalization(err.to_string()))?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex_encode(&digest))
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0 .. text.len())
        .step_by(2)
        .map(|idx| u8::from_str_radix(&text[idx .. idx + 2], 16).ok())
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_envelope(key: &[u8], payload: serde_json::Value, timestamp: OffsetDateTime) -> RawEnvelope {
        let canonical = serde_jcs::to_string(&payload).expect("canonicalizes");
        let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("valid key");
        mac.update(canonical.as_bytes());
        let signature = hex_encode(&mac.finalize().into_bytes());
        RawEnvelope {
            envelope_version: ENVELOPE_VERSION.to_string(),
            timestamp: timestamp.format(&Rfc3339).expect("formats"),
            signature,
            payload,
        }
    }

    fn sample_payload() -> serde_json::Value {
        serde_json::json!({
            "claim_id": "CLM-2026-000001",
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
        })
    }

    #[test]
    fn valid_envelope_verifies() {
        let key = b"test-signing-key";
        let now = OffsetDateTime::now_utc();
        let envelope = signed_envelope(key, sample_payload(), now);
        let verified = verify_envelope(&envelope, key, 600, now).expect("verifies");
        assert_eq!(verified.claim.claim_id, "CLM-2026-000001");
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let key = b"test-signing-key";
        let now = OffsetDateTime::now_utc();
        let mut envelope = signed_envelope(key, sample_payload(), now);
        envelope.payload["billed_amount"] = serde_json::json!(999_999.0);
        let err = verify_envelope(&envelope, key, 600, now).expect_err("should fail");
        assert_eq!(err, EnvelopeError::SignatureInvalid);
    }

    #[test]
    fn wrong_key_fails_signature() {
        let now = OffsetDateTime::now_utc();
        let envelope = signed_envelope(b"right-key", sample_payload(), now);
        let err = verify_envelope(&envelope, b"wrong-key", 600, now).expect_err("should fail");
        assert_eq!(err, EnvelopeError::SignatureInvalid);
    }

    #[test]
    fn stale_timestamp_violates_replay_window() {
        let key = b"test-signing-key";
        let now = OffsetDateTime::now_utc();
        let stale = now - time::Duration::seconds(3_600);
        let envelope = signed_envelope(key, sample_payload(), stale);
        let err = verify_envelope(&envelope, key, 600, now).expect_err("should fail");
        assert_eq!(err, EnvelopeError::ReplayWindowViolation);
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let key = b"test-signing-key";
        let now = OffsetDateTime::now_utc();
        let mut envelope = signed_envelope(key, sample_payload(), now);
        envelope.envelope_version = "2.0.0".to_string();
        let err = verify_envelope(&envelope, key, 600, now).expect_err("should fail");
        assert_eq!(err, EnvelopeError::SchemaVersionMismatch("2.0.0".to_string()));
    }
}

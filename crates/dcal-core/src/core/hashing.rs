// crates/dcal-core/src/core/hashing.rs
// ============================================================================
// Module: Hashing
// Description: Canonical JSON serialization and SHA-256 digest helpers.
// Purpose: Give the rule checksum, audit chain, and trace integrity hash a
//          single, shared canonicalization so independent recomputation
//          always agrees with the stored value.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Canonical JSON here means RFC 8785 JSON Canonicalization Scheme (JCS):
//! UTF-8, object keys sorted lexicographically, no insignificant
//! whitespace, numbers in shortest round-trip form. `serde_jcs` produces
//! this form directly from any `Serialize` value.

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Serializes `value` to canonical JSON (RFC 8785 JCS).
///
/// # Errors
/// Returns the underlying serialization error if `value` cannot be
/// represented as JSON at all (never fails for ordinary data types).
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_jcs::to_string(value)
}

/// Computes the lowercase-hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Computes the lowercase-hex SHA-256 digest of the canonical JSON form of
/// `value`.
///
/// # Errors
/// Returns the underlying serialization error if `value` cannot be
/// canonicalized.
pub fn sha256_hex_of_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// Computes `chain_hash = SHA256(content_hash || previous_hash)`, both
/// given as lowercase-hex strings, per the audit chain invariant.
#[must_use]
pub fn chain_hash(content_hash_hex: &str, previous_hash_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_hash_hex.as_bytes());
    hasher.update(previous_hash_hex.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_keys() {
        #[derive(Serialize)]
        struct Pair {
            b: i32,
            a: i32,
        }
        let json = canonical_json(&Pair { b: 2, a: 1 }).expect("serializes");
        assert_eq!(json, r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn sha256_is_deterministic() {
        let a = sha256_hex(b"hello");
        let b = sha256_hex(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn chain_hash_is_order_sensitive() {
        let a = chain_hash("content", "previous");
        let b = chain_hash("previous", "content");
        assert_ne!(a, b);
    }
}

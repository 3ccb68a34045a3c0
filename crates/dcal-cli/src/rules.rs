// crates/dcal-cli/src/rules.rs
// ============================================================================
// Module: Rule File Loader
// Description: Reads a ruleset/rule-definition bundle from disk into a
//              verified RuleSnapshot.
// Purpose: Back both startup rule loading and the `reload-rules` command
//          with the same file format and the same checksum/single-active
//          verification RuleSnapshot::build already enforces.
// Dependencies: dcal-core, serde_json, std::fs
// ============================================================================

//! ## Overview
//! The bundle is plain JSON: `{ "rulesets": [...], "definitions": [...] }`,
//! both shapes already `Serialize`/`Deserialize` in `dcal-core`. This
//! module only owns reading the file and surfacing
//! [`dcal_core::RuleSnapshot::build`]'s verification failures as a single
//! error type the CLI can map to an exit code.

use std::path::Path;

use dcal_core::RuleDefinition;
use dcal_core::RuleSnapshot;
use dcal_core::Ruleset;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// The on-disk shape of a rule bundle.
#[derive(Debug, Deserialize, Serialize)]
struct RuleBundle {
    rulesets: Vec<Ruleset>,
    definitions: Vec<RuleDefinition>,
}

/// Errors raised while loading a rule bundle.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    /// The bundle file could not be read.
    #[error("rule bundle io error: {0}")]
    Io(String),
    /// The bundle file was not valid JSON for the expected shape.
    #[error("rule bundle parse error: {0}")]
    Parse(String),
    /// The bundle failed checksum or single-active-ruleset verification.
    #[error("rule bundle verification failed: {0}")]
    Invalid(String),
}

/// Reads and verifies the rule bundle at `path`, returning a snapshot ready
/// to hand to [`dcal_core::RuleStore::new`] or
/// [`dcal_core::RuleStore::reload`].
///
/// # Errors
/// Returns [`RuleLoadError`] when the file cannot be read, is not valid
/// JSON, or fails [`dcal_core::RuleSnapshot::build`]'s verification.
pub fn load_rule_snapshot(path: &Path) -> Result<RuleSnapshot, RuleLoadError> {
    let content = std::fs::read_to_string(path).map_err(|err| RuleLoadError::Io(err.to_string()))?;
    let bundle: RuleBundle = serde_json::from_str(&content).map_err(|err| RuleLoadError::Parse(err.to_string()))?;
    RuleSnapshot::build(&bundle.rulesets, &bundle.definitions).map_err(|err| RuleLoadError::Invalid(err.to_string()))
}

#[cfg(test)]
mod tests {
    use dcal_core::RuleCategory;
    use dcal_core::RuleId;
    use dcal_core::RulesetStatus;
    use dcal_core::Severity;

    use super::*;

    fn rule(rule_id: &str) -> RuleDefinition {
        let mut definition = RuleDefinition {
            rule_id: RuleId::new(rule_id),
            version: "1.0.0".to_string(),
            name: "high value claim".to_string(),
            category: RuleCategory::Custom,
            severity: Severity::Major,
            enabled: true,
            condition_expression: "claim.billed_amount > 10000".to_string(),
            parameters: std::collections::BTreeMap::new(),
            applies_to: dcal_core::core::rule::Applicability { claim_types: vec![], jurisdictions: vec![] },
            effective_date: "2026-01-01T00:00:00Z".to_string(),
            expiration_date: None,
            checksum: String::new(),
            tags: vec![],
        };
        definition.checksum = definition.expected_checksum();
        definition
    }

    fn ruleset(version: &str, rule_ids: &[&str]) -> Ruleset {
        Ruleset {
            version: version.to_string(),
            status: RulesetStatus::Active,
            rule_ids: rule_ids.iter().map(|id| RuleId::new(*id)).collect(),
            activated_at: None,
        }
    }

    #[test]
    fn a_malformed_file_is_reported_as_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "not json").expect("writes");
        let err = load_rule_snapshot(&path).expect_err("should fail");
        assert!(matches!(err, RuleLoadError::Parse(_)));
    }

    #[test]
    fn a_missing_file_is_reported_as_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.json");
        let err = load_rule_snapshot(&path).expect_err("should fail");
        assert!(matches!(err, RuleLoadError::Io(_)));
    }

    #[test]
    fn a_well_formed_single_active_bundle_loads_successfully() {
        let definition = rule("RUL-1");
        let bundle = RuleBundle { rulesets: vec![ruleset("v1", &["RUL-1"])], definitions: vec![definition] };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.json");
        std::fs::write(&path, serde_json::to_vec(&bundle).expect("serializes")).expect("writes");
        assert!(load_rule_snapshot(&path).is_ok());
    }

    #[test]
    fn two_active_rulesets_are_rejected_as_invalid() {
        let definition = rule("RUL-1");
        let bundle = RuleBundle {
            rulesets: vec![ruleset("v1", &["RUL-1"]), ruleset("v2", &["RUL-1"])],
            definitions: vec![definition],
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.json");
        std::fs::write(&path, serde_json::to_vec(&bundle).expect("serializes")).expect("writes");
        let err = load_rule_snapshot(&path).expect_err("should fail");
        assert!(matches!(err, RuleLoadError::Invalid(_)));
    }
}

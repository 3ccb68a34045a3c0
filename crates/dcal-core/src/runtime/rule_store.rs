// crates/dcal-core/src/runtime/rule_store.rs
// ============================================================================
// Module: Rule Store
// Description: Checksummed, copy-on-reload ruleset snapshots (C2).
// Purpose: Serve the single ACTIVE ruleset to readers as an immutable
//          snapshot, swapped atomically on reload, never torn mid-read.
// Dependencies: std::sync::Arc, arc-swap-free atomic pointer via RwLock,
//               crate::core::rule
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::rule::RuleDefinition;
use crate::core::rule::Ruleset;
use crate::core::rule::RulesetStatus;

/// Errors raised while loading or reading a ruleset snapshot.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    /// A rule's stored checksum did not match the recomputed one.
    #[error("rule {rule_id} failed checksum verification on load")]
    ChecksumMismatch {
        /// The offending rule's identifier.
        rule_id: String,
    },
    /// A ruleset referenced a rule id with no matching definition.
    #[error("ruleset references unknown rule_id {rule_id}")]
    MissingRule {
        /// The dangling rule identifier.
        rule_id: String,
    },
    /// More than one ruleset in the load set claimed `ACTIVE` status.
    #[error("more than one ACTIVE ruleset supplied to load")]
    MultipleActiveRulesets,
    /// No ruleset in the load set was `ACTIVE`.
    #[error("no ACTIVE ruleset supplied to load")]
    NoActiveRuleset,
}

/// One immutable, checksum-verified snapshot: the ACTIVE ruleset plus the
/// rule definitions it references, in evaluation order.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    ruleset: Ruleset,
    rules: Vec<RuleDefinition>,
}

impl RuleSnapshot {
    /// Builds a snapshot, verifying every referenced rule's checksum and
    /// that exactly one `ACTIVE` ruleset was supplied.
    ///
    /// # Errors
    /// Returns [`RuleStoreError`] on checksum mismatch, a dangling
    /// `rule_id`, or an active-ruleset-count violation.
    pub fn build(rulesets: &[Ruleset], definitions: &[RuleDefinition]) -> Result<Self, RuleStoreError> {
        let mut active: Option<&Ruleset> = None;
        for ruleset in rulesets {
            if ruleset.status == RulesetStatus::Active {
                if active.is_some() {
                    return Err(RuleStoreError::MultipleActiveRulesets);
                }
                active = Some(ruleset);
            }
        }
        let active = active.ok_or(RuleStoreError::NoActiveRuleset)?;

        let mut rules = Vec::with_capacity(active.rule_ids.len());
        for rule_id in &active.rule_ids {
            let definition = definitions
                .iter()
                .find(|def| &def.rule_id == rule_id)
                .ok_or_else(|| RuleStoreError::MissingRule { rule_id: rule_id.to_string() })?;
            if !definition.checksum_is_valid() {
                return Err(RuleStoreError::ChecksumMismatch { rule_id: rule_id.to_string() });
            }
            rules.push(definition.clone());
        }

        Ok(Self { ruleset: active.clone(), rules })
    }

    /// Returns the ruleset version this snapshot serves.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.ruleset.version
    }

    /// Returns the enabled, non-expired rules applicable to `claim_type`
    /// and `jurisdiction` as of `now`, in mandated category order then
    /// stable by `rule_id`.
    #[must_use]
    pub fn get_applicable(&self, claim_type: &str, jurisdiction: &str, now: OffsetDateTime) -> Vec<&RuleDefinition> {
        let mut applicable: Vec<&RuleDefinition> = self
            .rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter(|rule| !is_expired(rule, now))
            .filter(|rule| rule.applies_to.matches(claim_type, jurisdiction))
            .collect();
        applicable.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.rule_id.cmp(&b.rule_id)));
        applicable
    }
}

fn is_expired(rule: &RuleDefinition, now: OffsetDateTime) -> bool {
    let Some(expiration) = &rule.expiration_date else {
        return false;
    };
    OffsetDateTime::parse(expiration, &time::format_description::well_known::Rfc3339)
        .is_ok_and(|expiry| expiry <= now)
}

/// Many-reader, single-writer holder for the current [`RuleSnapshot`].
/// Reload swaps the snapshot pointer atomically; in-flight readers keep
/// the snapshot they already acquired.
pub struct RuleStore {
    current: RwLock<Arc<RuleSnapshot>>,
}

impl RuleStore {
    /// Builds a store seeded with an initial, already-verified snapshot.
    #[must_use]
    pub fn new(initial: RuleSnapshot) -> Self {
        Self { current: RwLock::new(Arc::new(initial)) }
    }

    /// Returns a cheap clone of the current snapshot pointer. Recovers
    /// from a poisoned lock rather than panicking: a panic mid-read never
    /// leaves the snapshot pointer itself inconsistent.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        let guard = self.current.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Atomically swaps in a newly verified snapshot.
    pub fn reload(&self, snapshot: RuleSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::identifiers::RuleId;
    use crate::core::rule::Applicability;
    use crate::core::rule::Severity;

    fn rule(id: &str, category: crate::core::rule::RuleCategory) -> RuleDefinition {
        let mut def = RuleDefinition {
            rule_id: RuleId::from(id),
            version: "1.0.0".to_string(),
            name: id.to_string(),
            category,
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
        def.checksum = def.expected_checksum();
        def
    }

    #[test]
    fn build_rejects_checksum_mismatch() {
        let mut bad = rule("R-1", crate::core::rule::RuleCategory::Custom);
        bad.checksum = "deadbeef".to_string();
        let ruleset = Ruleset {
            version: "1.0.0".to_string(),
            status: RulesetStatus::Active,
            rule_ids: vec![bad.rule_id.clone()],
            activated_at: None,
        };
        let err = RuleSnapshot::build(&[ruleset], &[bad]).unwrap_err();
        assert!(matches!(err, RuleStoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn applicable_rules_are_category_ordered() {
        let critical = rule("R-2", crate::core::rule::RuleCategory::Critical);
        let custom = rule("R-1", crate::core::rule::RuleCategory::Custom);
        let ruleset = Ruleset {
            version: "1.0.0".to_string(),
            status: RulesetStatus::Active,
            rule_ids: vec![custom.rule_id.clone(), critical.rule_id.clone()],
            activated_at: None,
        };
        let snapshot = RuleSnapshot::build(&[ruleset], &[custom, critical]).expect("builds");
        let applicable = snapshot.get_applicable("PROFESSIONAL", "US", OffsetDateTime::now_utc());
        assert_eq!(applicable[0].rule_id.as_str(), "R-2");
    }
}

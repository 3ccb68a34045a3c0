// crates/dcal-broker/src/idempotency.rs
// ============================================================================
// Module: Idempotency Cache
// Description: Bounded dedupe cache keyed by (claim_id, envelope_hash).
// Purpose: Silently drop exact duplicate envelopes per spec §4.9.
// Dependencies: std::collections
// ============================================================================

//! ## Overview
//! A fixed-capacity, insertion-order-evicted set. Exact duplicates — same
//! `claim_id` and the same canonical-payload hash — are dropped; a claim
//! resubmitted with different content is not a duplicate and proceeds.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Bounded LRU-by-insertion-order dedupe cache.
pub struct IdempotencyCache {
    capacity: usize,
    seen: Mutex<(HashSet<String>, VecDeque<String>)>,
}

impl IdempotencyCache {
    /// Creates a cache holding at most `capacity` keys.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), seen: Mutex::new((HashSet::new(), VecDeque::new())) }
    }

    /// Returns `true` and records the key if this `(claim_id,
    /// envelope_hash)` pair has not been seen before; returns `false` for
    /// an exact duplicate.
    pub fn admit(&self, claim_id: &str, envelope_hash: &str) -> bool {
        let key = format!("{claim_id}:{envelope_hash}");
        let mut guard = self.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (set, order) = &mut *guard;

        if set.contains(&key) {
            return false;
        }

        if order.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                set.remove(&oldest);
            }
        }

        set.insert(key.clone());
        order.push_back(key);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_envelope_is_rejected() {
        let cache = IdempotencyCache::new(10);
        assert!(cache.admit("CLM-2026-000001", "hash-a"));
        assert!(!cache.admit("CLM-2026-000001", "hash-a"));
    }

    #[test]
    fn resubmission_with_different_content_is_not_a_duplicate() {
        let cache = IdempotencyCache::new(10);
        assert!(cache.admit("CLM-2026-000001", "hash-a"));
        assert!(cache.admit("CLM-2026-000001", "hash-b"));
    }

    #[test]
    fn capacity_evicts_oldest_entries() {
        let cache = IdempotencyCache::new(2);
        assert!(cache.admit("CLM-1", "h1"));
        assert!(cache.admit("CLM-2", "h2"));
        assert!(cache.admit("CLM-3", "h3"));
        assert!(cache.admit("CLM-1", "h1"));
    }
}

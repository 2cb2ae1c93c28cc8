//! Relevance ranking of candidate records against a detection.
//!
//! Three tiers, best first: exact name equality, substring containment in
//! either direction, everything else. Names are compared trimmed and
//! lowercased. The sort is stable, so records within a tier keep the order
//! the queries produced them in.

use std::collections::HashSet;

use crate::types::{Detection, NutritionRecord};

/// How well a record's names match a detection's names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    /// Some record name equals some detection name.
    Exact,
    /// Some name contains the other.
    Partial,
    /// No name relation.
    Unrelated,
}

fn normalized(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Tier of `record` for `detection`.
#[must_use]
pub fn tier(record: &NutritionRecord, detection: &Detection) -> MatchTier {
    let wanted: Vec<String> = detection
        .queries()
        .into_iter()
        .map(normalized)
        .filter(|n| !n.is_empty())
        .collect();
    let have: Vec<String> = record
        .names()
        .map(normalized)
        .filter(|n| !n.is_empty())
        .collect();

    let mut best = MatchTier::Unrelated;
    for w in &wanted {
        for h in &have {
            if w == h {
                return MatchTier::Exact;
            }
            if h.contains(w.as_str()) || w.contains(h.as_str()) {
                best = MatchTier::Partial;
            }
        }
    }
    best
}

/// Drop repeated record ids, keeping the first occurrence.
#[must_use]
pub fn dedup_by_id(records: Vec<NutritionRecord>) -> Vec<NutritionRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}

/// Stable sort of `records` by tier.
#[must_use]
pub fn rank(mut records: Vec<NutritionRecord>, detection: &Detection) -> Vec<NutritionRecord> {
    records.sort_by_cached_key(|r| tier(r, detection));
    records
}

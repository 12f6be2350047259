//! Drop patterns: canonical multisets of items recorded by a single report.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::TimeRange;

/// One `(item, quantity)` pair inside a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternEntry {
    #[serde(rename = "itemId")]
    pub item_id: i32,

    pub quantity: i64,
}

/// A canonical drop multiset. Entries are sorted by item id, so two reports
/// yield the same pattern iff their drop multisets are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DropPattern {
    pub drops: Vec<PatternEntry>,
}

impl DropPattern {
    /// Canonicalize a raw drop list: merge duplicate item ids, sort by item
    /// id, drop zero quantities.
    pub fn from_drops(raw: &[(i32, i64)]) -> Self {
        let mut merged: std::collections::BTreeMap<i32, i64> = std::collections::BTreeMap::new();
        for &(item_id, quantity) in raw {
            *merged.entry(item_id).or_default() += quantity;
        }
        let drops = merged
            .into_iter()
            .filter(|&(_, quantity)| quantity != 0)
            .map(|(item_id, quantity)| PatternEntry { item_id, quantity })
            .collect();
        Self { drops }
    }

    /// The canonical `item:qty|item:qty` serialization the pattern id is
    /// derived from.
    pub fn canonical(&self) -> String {
        let parts: Vec<String> = self
            .drops
            .iter()
            .map(|entry| format!("{}:{}", entry.item_id, entry.quantity))
            .collect();
        parts.join("|")
    }

    /// Deterministic pattern id: first 16 hex chars of the SHA-256 of the
    /// canonical serialization.
    pub fn pattern_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }
}

/// One pattern matrix cell: how often `pattern` occurred at `stage_id`
/// during `range_id`, out of `times` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnePatternMatrixElement {
    #[serde(rename = "stageId")]
    pub stage_id: i32,

    pub pattern: DropPattern,

    #[serde(rename = "rangeId")]
    pub range_id: i32,

    pub quantity: i64,

    pub times: i64,

    #[serde(rename = "timeRange", skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// A pattern matrix query result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatrixQueryResult {
    #[serde(rename = "patternMatrix")]
    pub pattern_matrix: Vec<OnePatternMatrixElement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_canonical_order() {
        let a = DropPattern::from_drops(&[(3, 1), (1, 2)]);
        let b = DropPattern::from_drops(&[(1, 2), (3, 1)]);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "1:2|3:1");
    }

    #[test]
    fn test_pattern_merges_duplicates() {
        let pattern = DropPattern::from_drops(&[(1, 1), (1, 2)]);
        assert_eq!(pattern.canonical(), "1:3");
    }

    #[test]
    fn test_pattern_drops_zero_quantities() {
        let pattern = DropPattern::from_drops(&[(1, 0), (2, 1)]);
        assert_eq!(pattern.canonical(), "2:1");
    }

    #[test]
    fn test_pattern_id_deterministic() {
        let a = DropPattern::from_drops(&[(1, 2), (3, 1)]);
        let b = DropPattern::from_drops(&[(3, 1), (1, 2)]);
        assert_eq!(a.pattern_id(), b.pattern_id());
        assert_eq!(a.pattern_id().len(), 16);
        assert!(a.pattern_id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_patterns_distinct_ids() {
        let a = DropPattern::from_drops(&[(1, 2)]);
        let b = DropPattern::from_drops(&[(1, 3)]);
        assert_ne!(a.pattern_id(), b.pattern_id());
    }

    #[test]
    fn test_empty_pattern() {
        let pattern = DropPattern::from_drops(&[]);
        assert!(pattern.is_empty());
        assert_eq!(pattern.canonical(), "");
    }
}

//! Deduplication & Relationships: near-duplicate detection on write and
//! pairwise relationship-strength edges feeding the aging engine's
//! relevance boost. See `spec.md` §4.6.

use crate::constants::{CASCADE_DELETE_FLOOR, RELATIONSHIP_BOOST_FLOOR, RELATIONSHIP_DAILY_DECAY};
use crate::query::content_similarity;
use crate::types::{MemoryId, Relationship};

/// Explicit result variant for a write-time duplicate check, replacing the
/// exception-for-control-flow pattern called out in `spec.md` §9.
#[derive(Debug, Clone)]
pub enum DuplicateCheck {
    /// No existing memory is similar enough to be a duplicate.
    Unique,
    /// At least one existing memory exceeded the similarity threshold.
    /// Candidates are sorted by descending similarity.
    Duplicate(Vec<DuplicateCandidate>),
}

impl DuplicateCheck {
    /// True if this is the `Duplicate` variant.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateCheck::Duplicate(_))
    }
}

/// One candidate duplicate, with its similarity to the prospective write.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateCandidate {
    /// The existing memory's id.
    pub id: MemoryId,
    /// Similarity in `[0, 1]`.
    pub similarity: f32,
}

/// Check `candidate_content` against every existing memory in the same
/// `(tier, scope, project_id)` (already filtered by the caller), returning
/// the top-k most similar above `threshold`.
#[must_use]
pub fn check_duplicates(
    candidate_content: &str,
    existing: &[(MemoryId, String)],
    threshold: f32,
    top_k: usize,
) -> DuplicateCheck {
    let mut hits: Vec<DuplicateCandidate> = existing
        .iter()
        .map(|(id, content)| DuplicateCandidate {
            id: *id,
            similarity: content_similarity(candidate_content, content),
        })
        .filter(|c| c.similarity >= threshold)
        .collect();

    if hits.is_empty() {
        return DuplicateCheck::Unique;
    }

    hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_k.max(1));
    DuplicateCheck::Duplicate(hits)
}

/// Infer relationship edges from a newly stored memory's content against
/// every other existing memory in the same backend, keeping only pairs
/// whose similarity clears `RELATIONSHIP_BOOST_FLOOR`.
#[must_use]
pub fn infer_relationships(new_id: MemoryId, new_content: &str, existing: &[(MemoryId, String)]) -> Vec<Relationship> {
    existing
        .iter()
        .filter_map(|(id, content)| {
            let similarity = content_similarity(new_content, content);
            if similarity >= RELATIONSHIP_BOOST_FLOOR {
                Relationship::new(new_id, *id, similarity)
            } else {
                None
            }
        })
        .collect()
}

/// Apply lazy multiplicative decay to a relationship strength based on how
/// many whole days have passed since it was last reinforced.
#[must_use]
pub fn decay_strength(strength: f32, days_since_reinforced: f32) -> f32 {
    if days_since_reinforced <= 0.0 {
        return strength.clamp(0.0, 1.0);
    }
    (strength * RELATIONSHIP_DAILY_DECAY.powf(days_since_reinforced)).clamp(0.0, 1.0)
}

/// Reinforce an existing edge (e.g. it was observed again), saturating at
/// 1.0.
#[must_use]
pub fn reinforce_strength(strength: f32, observed_similarity: f32) -> f32 {
    strength.max(observed_similarity).min(1.0)
}

/// Every memory connected to `target` by an edge at or above the
/// cascade-delete floor, as of `edges`.
#[must_use]
pub fn cascade_delete_targets(target: MemoryId, edges: &[Relationship]) -> Vec<MemoryId> {
    edges
        .iter()
        .filter(|e| e.touches(target) && e.strength >= CASCADE_DELETE_FLOOR)
        .filter_map(|e| e.other(target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_has_no_duplicates() {
        let result = check_duplicates("hello world", &[], 0.8, 5);
        assert!(!result.is_duplicate());
    }

    #[test]
    fn identical_content_is_flagged_duplicate() {
        let id = MemoryId::new();
        let existing = vec![(id, "hello world".to_string())];
        let result = check_duplicates("hello world", &existing, 0.8, 5);
        match result {
            DuplicateCheck::Duplicate(candidates) => {
                assert_eq!(candidates[0].id, id);
                assert!(candidates[0].similarity >= 0.8);
            }
            DuplicateCheck::Unique => panic!("expected duplicate"),
        }
    }

    #[test]
    fn threshold_one_matches_only_byte_identical() {
        let id = MemoryId::new();
        let existing = vec![(id, "hello world!".to_string())];
        let result = check_duplicates("hello world", &existing, 1.0, 5);
        assert!(!result.is_duplicate());

        let existing_exact = vec![(id, "hello world".to_string())];
        let result_exact = check_duplicates("hello world", &existing_exact, 1.0, 5);
        assert!(result_exact.is_duplicate());
    }

    #[test]
    fn cascade_targets_only_include_strong_edges() {
        let a = MemoryId::new();
        let b = MemoryId::new();
        let c = MemoryId::new();
        let edges = vec![
            Relationship::new(a, b, 0.85).unwrap(),
            Relationship::new(a, c, 0.5).unwrap(),
        ];
        let targets = cascade_delete_targets(a, &edges);
        assert_eq!(targets, vec![b]);
    }

    #[test]
    fn decay_reduces_strength_over_time() {
        let decayed = decay_strength(1.0, 10.0);
        assert!(decayed < 1.0);
        assert!(decayed > 0.0);
    }

    #[test]
    fn decay_is_noop_for_same_day_reinforcement() {
        assert_eq!(decay_strength(0.7, 0.0), 0.7);
    }

    #[test]
    fn reinforce_saturates_at_one() {
        assert_eq!(reinforce_strength(0.9, 0.95), 0.95);
        assert_eq!(reinforce_strength(0.99, 1.5), 1.0);
    }

    #[test]
    fn infer_relationships_skips_weak_similarity() {
        let new_id = MemoryId::new();
        let existing = vec![(MemoryId::new(), "completely unrelated blob".to_string())];
        let edges = infer_relationships(new_id, "rust tokio async", &existing);
        assert!(edges.is_empty());
    }
}

//! Query Engine: combined lexical + tag + TF-IDF-style ranking, plus the
//! normalized content similarity used for write-time deduplication. See
//! `spec.md` §4.5.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::constants::{MAX_QUERY_LIMIT, QUERY_MIN_SCORE};
use crate::types::MemoryId;

/// Lowercase, split on non-alphanumerics, drop length-1 tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

fn trigrams(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    if chars.len() < 3 {
        return std::iter::once(lower).collect();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

fn jaccard<T: std::hash::Hash + Eq>(a: &HashSet<T>, b: &HashSet<T>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    intersection / union
}

/// Term-frequency vector as counts per token.
fn term_frequencies(tokens: &[String]) -> HashMap<&str, u32> {
    let mut tf = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    tf
}

/// Cosine similarity between two documents' term-frequency vectors,
/// optionally weighted by inverse document frequency from `doc_freq`/
/// `corpus_size` (pass `None` to fall back to plain TF cosine — used for
/// pairwise dedup similarity where no corpus is available).
fn tfidf_cosine(a: &str, b: &str, doc_freq: Option<(&HashMap<String, u32>, usize)>) -> f32 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    let tf_a = term_frequencies(&a_tokens);
    let tf_b = term_frequencies(&b_tokens);

    let idf = |term: &str| -> f32 {
        match doc_freq {
            Some((freqs, corpus_size)) if corpus_size > 0 => {
                let df = freqs.get(term).copied().unwrap_or(0).max(1) as f32;
                ((corpus_size as f32 + 1.0) / df).ln().max(0.0) + 1.0
            }
            _ => 1.0,
        }
    };

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    let vocab: HashSet<&str> = tf_a.keys().chain(tf_b.keys()).copied().collect();
    for term in vocab {
        let wa = tf_a.get(term).copied().unwrap_or(0) as f32 * idf(term);
        let wb = tf_b.get(term).copied().unwrap_or(0) as f32 * idf(term);
        dot += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Normalized `[0, 1]` similarity between two contents, combining exact
/// equality, TF-IDF-style cosine, and a lexical trigram overlap. Used by
/// `check_duplicate_memory` and by relationship-strength inference on
/// write.
///
/// Byte-identical content always yields exactly `1.0`, matching the
/// boundary behavior in `spec.md` §8 ("similarity threshold exactly 1.0
/// matches only byte-identical content").
#[must_use]
pub fn content_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let tfidf = tfidf_cosine(a, b, None);
    let lexical = jaccard(&trigrams(a), &trigrams(b));
    (0.4 * tfidf + 0.6 * lexical).clamp(0.0, 0.999_999)
}

/// One document available for query-time ranking.
#[derive(Debug, Clone)]
pub struct CandidateDoc {
    /// The candidate's id.
    pub id: MemoryId,
    /// Full text content.
    pub content: String,
    /// Tag set.
    pub tags: HashSet<String>,
    /// Eviction/relevance priority, 0-10.
    pub priority: u8,
    /// Total access count.
    pub access_count: u64,
    /// Timestamp of the most recent access (tie-break key).
    pub accessed_at: DateTime<Utc>,
}

/// How a result matched the query, returned to the caller for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Query string appears verbatim in the content.
    Exact,
    /// A query token matched one of the candidate's tags.
    Tag,
    /// Matched primarily on token overlap / TF-IDF similarity.
    Lexical,
}

/// A ranked query result.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// The candidate's id.
    pub id: MemoryId,
    /// Combined relevance score (unbounded; higher is better).
    pub score: f32,
    /// Dominant reason this candidate matched.
    pub match_type: MatchType,
}

fn score_one(query: &str, query_tokens: &[String], doc: &CandidateDoc, doc_freq: Option<(&HashMap<String, u32>, usize)>) -> (f32, MatchType) {
    let content_lower = doc.content.to_lowercase();
    let query_lower = query.to_lowercase();

    let exact = content_lower.contains(&query_lower) && !query_lower.is_empty();
    let exact_bonus = if exact { 100.0 } else { 0.0 };

    let tag_match = query_tokens
        .iter()
        .any(|qt| doc.tags.iter().any(|tag| tag.to_lowercase() == *qt));
    let tag_bonus = if tag_match { 80.0 } else { 0.0 };

    let doc_token_set = token_set(&doc.content);
    let matching = query_tokens.iter().filter(|qt| doc_token_set.contains(*qt)).count();
    let term_overlap_score = if query_tokens.is_empty() {
        0.0
    } else {
        60.0 * (matching as f32 / query_tokens.len() as f32)
    };

    let priority_boost = f32::from(doc.priority) * 2.0;
    let access_boost = (doc.access_count.min(20)) as f32;

    let tfidf = tfidf_cosine(query, &doc.content, doc_freq);
    let lexical = jaccard(&trigrams(query), &trigrams(&doc.content));
    let semantic_contribution = 40.0 * (0.4 * tfidf + 0.6 * lexical);

    let total = exact_bonus + tag_bonus + term_overlap_score + priority_boost + access_boost + semantic_contribution;

    let match_type = if exact {
        MatchType::Exact
    } else if tag_match {
        MatchType::Tag
    } else {
        MatchType::Lexical
    };

    (total, match_type)
}

/// Rank, threshold, and truncate candidates for a query, per `spec.md`
/// §4.5 steps 1-5. Does not record access — callers do that for whichever
/// ids make the final cut.
#[must_use]
pub fn rank_candidates(
    query: &str,
    candidates: &[CandidateDoc],
    doc_freq: Option<(&HashMap<String, u32>, usize)>,
    limit: usize,
) -> Vec<ScoredCandidate> {
    let query_tokens = tokenize(query);
    let limit = limit.min(MAX_QUERY_LIMIT);

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|doc| {
            let (score, match_type) = score_one(query, &query_tokens, doc, doc_freq);
            ScoredCandidate {
                id: doc.id,
                score,
                match_type,
            }
        })
        .filter(|c| c.score > QUERY_MIN_SCORE)
        .collect();

    let by_id: HashMap<MemoryId, &CandidateDoc> = candidates.iter().map(|c| (c.id, c)).collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let da = by_id.get(&a.id).map(|d| d.accessed_at);
                let db = by_id.get(&b.id).map(|d| d.accessed_at);
                db.cmp(&da)
            })
            .then_with(|| {
                let ca = by_id.get(&a.id).map(|d| d.access_count).unwrap_or(0);
                let cb = by_id.get(&b.id).map(|d| d.access_count).unwrap_or(0);
                cb.cmp(&ca)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: MemoryId, content: &str, tags: &[&str], priority: u8, access_count: u64) -> CandidateDoc {
        CandidateDoc {
            id,
            content: content.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            priority,
            access_count,
            accessed_at: Utc::now(),
        }
    }

    #[test]
    fn byte_identical_content_has_similarity_one() {
        assert_eq!(content_similarity("hello world", "hello world"), 1.0);
    }

    #[test]
    fn different_content_has_similarity_below_one() {
        assert!(content_similarity("hello world", "goodbye moon") < 1.0);
    }

    #[test]
    fn similar_content_scores_higher_than_dissimilar() {
        let a = content_similarity("use tokio for async runtime", "use tokio for the async runtime");
        let b = content_similarity("use tokio for async runtime", "my cat likes naps");
        assert!(a > b);
    }

    #[test]
    fn exact_substring_match_ranks_above_lexical_only_match() {
        let id1 = MemoryId::new();
        let id2 = MemoryId::new();
        let candidates = vec![
            doc(id1, "the quick brown fox jumps", &[], 5, 0),
            doc(id2, "quick notes about something else entirely", &[], 5, 0),
        ];
        let ranked = rank_candidates("quick brown fox", &candidates, None, 10);
        assert_eq!(ranked[0].id, id1);
        assert_eq!(ranked[0].match_type, MatchType::Exact);
    }

    #[test]
    fn tag_match_contributes_meaningful_score() {
        let id1 = MemoryId::new();
        let candidates = vec![doc(id1, "totally unrelated body text here", &["rust"], 5, 0)];
        let ranked = rank_candidates("rust", &candidates, None, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].match_type, MatchType::Tag);
    }

    #[test]
    fn below_threshold_candidates_are_dropped() {
        let id1 = MemoryId::new();
        let candidates = vec![doc(id1, "nothing in common whatsoever", &[], 0, 0)];
        let ranked = rank_candidates("zzz yyy xxx", &candidates, None, 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn results_are_truncated_to_limit() {
        let candidates: Vec<CandidateDoc> = (0..5)
            .map(|_| doc(MemoryId::new(), "rust async tokio runtime example", &[], 5, 0))
            .collect();
        let ranked = rank_candidates("rust async tokio", &candidates, None, 2);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn tie_break_prefers_more_recent_access() {
        let id1 = MemoryId::new();
        let id2 = MemoryId::new();
        let now = Utc::now();
        let mut candidates = vec![
            doc(id1, "rust async tokio runtime", &[], 5, 3),
            doc(id2, "rust async tokio runtime", &[], 5, 3),
        ];
        candidates[0].accessed_at = now - chrono::Duration::hours(2);
        candidates[1].accessed_at = now;
        let ranked = rank_candidates("rust async tokio", &candidates, None, 10);
        assert_eq!(ranked[0].id, id2);
    }

    #[test]
    fn empty_query_tokens_never_panics() {
        let candidates = vec![doc(MemoryId::new(), "anything", &[], 5, 0)];
        let ranked = rank_candidates("   ", &candidates, None, 10);
        assert!(ranked.is_empty());
    }
}

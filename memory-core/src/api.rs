//! Typed request/response shapes for the engine's seven operations. These
//! are transport-agnostic; `memory-mcp` maps JSON-RPC params onto these
//! types and maps `Error` back onto the wire error taxonomy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::DuplicateCandidate;
use crate::query::MatchType;
use crate::types::{Memory, MemoryId, Scope, Tier};

/// `store_memory` arguments.
#[derive(Debug, Clone)]
pub struct StoreMemoryRequest {
    /// Text content to store.
    pub content: String,
    /// Target tier.
    pub tier: Tier,
    /// Target scope.
    pub scope: Scope,
    /// Required when `scope == Scope::Project`.
    pub project_id: Option<String>,
    /// Tags to attach.
    pub tags: Vec<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Bypass the deduplication check.
    pub allow_duplicate: bool,
}

/// `search_memory` arguments.
#[derive(Debug, Clone)]
pub struct SearchMemoryRequest {
    /// Query text.
    pub query: String,
    /// Restrict to one tier.
    pub tier: Option<Tier>,
    /// Restrict to one scope.
    pub scope: Option<Scope>,
    /// Restrict to one project.
    pub project_id: Option<String>,
    /// Restrict to memories carrying this tag.
    pub tag: Option<String>,
    /// Max results, 1-50 (0 is legal and returns no results).
    pub limit: Option<usize>,
}

/// One ranked `search_memory` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched memory.
    pub memory: Memory,
    /// Combined relevance score.
    pub score: f32,
    /// Dominant match reason.
    pub match_type: MatchType,
}

/// Aggregate counts returned by `get_memory_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Total memory count across both tiers.
    pub total_count: u64,
    /// Total stored bytes across both tiers.
    pub total_bytes: u64,
    /// Count per tier.
    pub per_tier: HashMap<String, u64>,
    /// Count per scope.
    pub per_scope: HashMap<String, u64>,
    /// Most frequently used tags, descending.
    pub top_tags: Vec<(String, u64)>,
    /// Currently known project ids.
    pub active_projects: Vec<String>,
    /// Timestamp of the last maintenance sweep, if one has run.
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

/// `delete_memory` outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// Whether the target memory was removed.
    pub deleted: bool,
    /// Count of cascade-deleted related memories, when requested.
    pub related_deleted: Option<u64>,
    /// Human-readable summary.
    pub message: String,
}

/// `check_duplicate_memory` outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheckOutcome {
    /// Whether any existing memory exceeded the similarity threshold.
    pub is_duplicate: bool,
    /// The top-k most similar existing memories.
    pub duplicates: Vec<DuplicateCandidateView>,
    /// A short recommendation string for the caller.
    pub recommendation: String,
}

/// Wire-friendly view of a `DuplicateCandidate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidateView {
    /// The existing memory's id.
    pub id: MemoryId,
    /// Similarity in `[0, 1]`.
    pub similarity: f32,
}

impl From<DuplicateCandidate> for DuplicateCandidateView {
    fn from(c: DuplicateCandidate) -> Self {
        Self {
            id: c.id,
            similarity: c.similarity,
        }
    }
}

/// `migrate_memory_tier` outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateOutcome {
    /// Whether the migration was applied.
    pub migrated: bool,
    /// Tier before the migration.
    pub from_tier: Tier,
    /// Tier after the migration.
    pub to_tier: Tier,
    /// Human-readable summary.
    pub message: String,
}

/// `get_memory_analytics` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryAnalytics {
    /// Access counts bucketed by content class.
    pub access_by_class: HashMap<String, u64>,
    /// Memory counts bucketed by lifecycle phase.
    pub phase_distribution: HashMap<String, u64>,
    /// Tier counts (duplicated from stats for a single-call view).
    pub tier_distribution: HashMap<String, u64>,
    /// Free-form optimization hints the engine can compute cheaply (e.g.
    /// "N core-cache memories recommend demotion").
    pub optimization_hints: Vec<String>,
}

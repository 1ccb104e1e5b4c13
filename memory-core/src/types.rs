//! Core data model: `Memory`, `Relationship`, and the enums that classify
//! them. See `spec.md` §3 for the authoritative invariants.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, opaque identifier for a memory. Monotonically assigned by
/// `identity::IdGenerator`; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(Uuid);

impl MemoryId {
    /// Generate a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid (used when round-tripping from storage).
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying uuid.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Storage tier: hot in-process cache vs. persistent long-term store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Bounded, always-resident compressed block store.
    Core,
    /// Persistent store with no hard content size bound.
    Longterm,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Core => write!(f, "core"),
            Tier::Longterm => write!(f, "longterm"),
        }
    }
}

/// Visibility scope: shared across all projects, or isolated to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Visible regardless of the caller's effective project.
    Global,
    /// Visible only when the caller's effective `project_id` matches.
    Project,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Project => write!(f, "project"),
        }
    }
}

/// Closed set of content classes the aging engine classifies memories into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    /// Source code fragment.
    CodeSnippet,
    /// Build/tool/environment configuration.
    Configuration,
    /// Prose documentation or explanation.
    Documentation,
    /// An explicit preference the user stated.
    UserPreference,
    /// Facts about the current project's architecture or conventions.
    ProjectContext,
    /// Short-lived scratch note.
    TemporaryNote,
    /// A snapshot of transient system/runtime state.
    SystemState,
    /// Data captured to improve future retrieval or classification.
    LearningData,
    /// Durable reference material (API docs, specs, links).
    ReferenceMaterial,
    /// A reusable sequence of steps or approach.
    WorkflowPattern,
}

/// Lifecycle phase assigned by the aging engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Created less than a day ago.
    Fresh,
    /// Frequently accessed and scoring well.
    Active,
    /// Neither fresh nor in active decline.
    Stable,
    /// Usage and age both trending down.
    Declining,
    /// Rarely used but semantically dense.
    Dormant,
    /// Composite score has dropped below the staleness floor.
    Stale,
    /// Explicitly tagged deprecated.
    Deprecated,
}

/// The only first-class entity the engine stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Stable unique identifier.
    pub id: MemoryId,
    /// UTF-8 text content.
    pub content: String,
    /// Storage tier placement.
    pub tier: Tier,
    /// Visibility scope.
    pub scope: Scope,
    /// Required when `scope == Scope::Project`; absent for `Scope::Global`.
    pub project_id: Option<String>,
    /// Deduplicated, case-preserved tag set.
    pub tags: HashSet<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent successful read.
    pub accessed_at: DateTime<Utc>,
    /// Monotonic non-negative read counter.
    pub access_count: u64,
    /// Byte length of the stored (possibly compressed) representation.
    pub content_size_bytes: u64,
    /// True if the cache tier stored a compressed payload.
    pub is_compressed: bool,
    /// Eviction priority, range 0-10, default 5.
    pub priority: u8,
}

impl Memory {
    /// Validate the `scope ⇔ project_id` invariant from `spec.md` §3.
    #[must_use]
    pub fn scope_is_consistent(&self) -> bool {
        match self.scope {
            Scope::Global => self.project_id.is_none(),
            Scope::Project => self.project_id.as_deref().is_some_and(|p| !p.is_empty()),
        }
    }
}

/// Undirected similarity edge between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Lower-sorted endpoint (sorting makes the pair canonical, so the
    /// undirected-edge invariant in `spec.md` §3 holds trivially).
    pub a_id: MemoryId,
    /// Higher-sorted endpoint.
    pub b_id: MemoryId,
    /// Strength in `[0, 1]`.
    pub strength: f32,
}

impl Relationship {
    /// Build a canonical (sorted) edge, rejecting self-loops.
    pub fn new(x: MemoryId, y: MemoryId, strength: f32) -> Option<Self> {
        if x == y {
            return None;
        }
        let (a_id, b_id) = if x < y { (x, y) } else { (y, x) };
        Some(Self {
            a_id,
            b_id,
            strength: strength.clamp(0.0, 1.0),
        })
    }

    /// True if this edge touches `id`.
    #[must_use]
    pub fn touches(&self, id: MemoryId) -> bool {
        self.a_id == id || self.b_id == id
    }

    /// The endpoint that isn't `id`, if this edge touches it.
    #[must_use]
    pub fn other(&self, id: MemoryId) -> Option<MemoryId> {
        if self.a_id == id {
            Some(self.b_id)
        } else if self.b_id == id {
            Some(self.a_id)
        } else {
            None
        }
    }
}

/// Derived aging state attached 1:1 to a memory once classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingProfile {
    /// The memory this profile describes.
    pub memory_id: MemoryId,
    /// Inferred content class.
    pub content_class: ContentClass,
    /// Current aging rate in `[0.1, 1.0]`.
    pub aging_rate: f32,
    /// Adaptive half-life in days.
    pub half_life_days: f32,
    /// Composite relevance score in `[0, 1]`.
    pub composite_score: f32,
    /// Lifecycle phase.
    pub phase: Phase,
    /// When this profile should next be recomputed.
    pub next_evaluation_at: DateTime<Utc>,
}

/// A migration the aging engine recommends; the dispatcher or maintenance
/// scheduler decides whether to apply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationRecommendation {
    /// Composite score fell below 0.4 while resident in the core cache.
    Demote,
    /// Composite score exceeded 0.8 and phase is active while in long-term.
    Promote,
    /// No migration recommended.
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_rejects_self_loop() {
        let id = MemoryId::new();
        assert!(Relationship::new(id, id, 0.5).is_none());
    }

    #[test]
    fn relationship_is_canonical_regardless_of_argument_order() {
        let a = MemoryId::new();
        let b = MemoryId::new();
        let r1 = Relationship::new(a, b, 0.6).unwrap();
        let r2 = Relationship::new(b, a, 0.6).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn relationship_clamps_strength() {
        let a = MemoryId::new();
        let b = MemoryId::new();
        let r = Relationship::new(a, b, 1.5).unwrap();
        assert_eq!(r.strength, 1.0);
    }

    #[test]
    fn memory_id_round_trips_through_string() {
        let id = MemoryId::new();
        let s = id.to_string();
        let parsed: MemoryId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }
}

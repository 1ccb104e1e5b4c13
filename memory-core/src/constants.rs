//! Default knobs for the engine. See `spec.md` §4.2, §4.5, §6 for the
//! authoritative defaults this module encodes.

/// Default total byte budget for the core cache.
pub const DEFAULT_CACHE_MAX_TOTAL_BYTES: u64 = 2048;

/// Fraction of the cache budget at which compression kicks in.
pub const DEFAULT_COMPRESSION_THRESHOLD: f64 = 0.8;

/// Minimum fractional byte savings required to keep a compressed
/// representation instead of the raw payload.
pub const MIN_COMPRESSION_SAVINGS: f64 = 0.20;

/// Default eviction-score priority when none is supplied.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Inclusive priority range.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 0..=10;

/// Default similarity threshold above which two contents are duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Relationship edges below this strength are not considered for relevance
/// boosting.
pub const RELATIONSHIP_BOOST_FLOOR: f32 = 0.3;

/// Cascade-delete removes memories connected by an edge at or above this
/// strength.
pub const CASCADE_DELETE_FLOOR: f32 = 0.7;

/// Daily multiplicative decay applied to relationship strength when a pair
/// goes unreinforced.
pub const RELATIONSHIP_DAILY_DECAY: f32 = 0.95;

/// Minimum relevance score a query candidate must clear to be returned.
pub const QUERY_MIN_SCORE: f32 = 20.0;

/// Default result count when `limit` is not supplied.
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Maximum allowed `limit` for `search_memory`.
pub const MAX_QUERY_LIMIT: usize = 50;

/// Default number of simultaneously open per-project backends before the
/// LRU evicts the oldest.
pub const DEFAULT_WORKSPACE_LRU_CAPACITY: usize = 10;

/// Resource-sampling maintenance cadence.
pub const RESOURCE_SAMPLE_INTERVAL_SECS: u64 = 30;

/// Idle-workspace cleanup cadence.
pub const IDLE_WORKSPACE_CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Floor applied to `next_evaluation_at` scheduling: a profile is never
/// scheduled to re-evaluate sooner than this, even for very short
/// half-lives.
pub const MIN_REEVALUATION_DAYS: f32 = 1.0;

/// Per-method rate limit defaults (tokens per second), in wire order.
pub mod rate_limits {
    /// `store_memory`
    pub const STORE_MEMORY: u32 = 10;
    /// `search_memory`
    pub const SEARCH_MEMORY: u32 = 20;
    /// `get_memory_stats`
    pub const GET_MEMORY_STATS: u32 = 5;
    /// `delete_memory`
    pub const DELETE_MEMORY: u32 = 5;
    /// `check_duplicate_memory`
    pub const CHECK_DUPLICATE_MEMORY: u32 = 10;
    /// `migrate_memory_tier`
    pub const MIGRATE_MEMORY_TIER: u32 = 5;
    /// `get_memory_analytics`
    pub const GET_MEMORY_ANALYTICS: u32 = 3;
}

/// Request cancellation deadline, per `spec.md` §5.
pub const REQUEST_DEADLINE_SECS: u64 = 30;

/// Schema version this build expects; bumped whenever `memory-storage`'s
/// `CREATE TABLE` statements change shape.
pub const SCHEMA_VERSION: i64 = 1;

//! Database schema definitions for the libsql long-term store.

/// SQL to create the memories table: one row per long-term memory.
pub const CREATE_MEMORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    tier TEXT NOT NULL,
    scope TEXT NOT NULL,
    project_id TEXT,
    tags TEXT NOT NULL,
    metadata TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    accessed_at INTEGER NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    content_size_bytes INTEGER NOT NULL,
    is_compressed INTEGER NOT NULL DEFAULT 0,
    priority INTEGER NOT NULL DEFAULT 5
)
"#;

/// Index on scope/project for `ScanFilter` restriction.
pub const CREATE_MEMORIES_SCOPE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_scope
ON memories(scope, project_id)
"#;

/// Index on creation time for `ScanFilter::since` and recency queries.
pub const CREATE_MEMORIES_CREATED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_created_at
ON memories(created_at DESC)
"#;

/// Tag index: one row per (tag, memory) pair, for `tag_index_lookup` and
/// `ScanFilter::tag` without scanning every memory's JSON tag array.
pub const CREATE_TAG_INDEX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tag_index (
    tag TEXT NOT NULL,
    memory_id TEXT NOT NULL,
    PRIMARY KEY (tag, memory_id)
)
"#;

/// Index on tag for fast `tag_index_lookup`.
pub const CREATE_TAG_INDEX_TAG_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tag_index_tag
ON tag_index(tag)
"#;

/// Relationship edges. Canonicalized by `Relationship::new` before storage,
/// so `(a_id, b_id)` is the undirected pair's unique key.
pub const CREATE_RELATIONSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    a_id TEXT NOT NULL,
    b_id TEXT NOT NULL,
    strength REAL NOT NULL,
    PRIMARY KEY (a_id, b_id)
)
"#;

/// Index on `b_id` so `relationships_for` finds edges regardless of which
/// side of the canonical pair the queried id landed on.
pub const CREATE_RELATIONSHIPS_B_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_relationships_b
ON relationships(b_id)
"#;

/// One aging profile per memory, recomputed on each aging sweep.
pub const CREATE_AGING_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS aging_profiles (
    memory_id TEXT PRIMARY KEY NOT NULL,
    content_class TEXT NOT NULL,
    aging_rate REAL NOT NULL,
    half_life_days REAL NOT NULL,
    composite_score REAL NOT NULL,
    phase TEXT NOT NULL,
    next_evaluation_at INTEGER NOT NULL
)
"#;

/// Index driving the background aging sweep's `due_aging_profiles` query.
pub const CREATE_AGING_PROFILES_NEXT_EVAL_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_aging_profiles_next_eval
ON aging_profiles(next_evaluation_at)
"#;

/// Schema-version and other single-row bookkeeping.
pub const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

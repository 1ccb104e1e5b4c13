//! `LibsqlBackend`: the embedded-database implementation of
//! `memory_core::storage::StorageBackend`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use libsql::{Builder, Connection, Database};
use memory_core::constants::SCHEMA_VERSION;
use memory_core::storage::{ScanFilter, StorageBackend};
use memory_core::types::{AgingProfile, ContentClass, Memory, MemoryId, Phase, Relationship, Scope, Tier};
use memory_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::error::storage_error;
use crate::{fts5_schema, schema};

/// One open libsql database: either `global.db` or one project's
/// `projects/<slug>.db`. Connections are opened per call; libsql's
/// `Connection` is cheap to create and safe to use concurrently against the
/// same `Database` handle.
pub struct LibsqlBackend {
    db: Arc<Database>,
}

impl LibsqlBackend {
    /// Open (creating if absent) the database file at `path`, running
    /// schema migration and checking the schema version.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the file can't be created or
    /// connected to, and `Error::SchemaMismatch` if an existing database
    /// was built by an incompatible schema version.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| storage_error("failed to open database", e))?;
        Self::from_database(db).await
    }

    /// Open a private in-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| storage_error("failed to open in-memory database", e))?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let backend = Self { db: Arc::new(db) };
        backend.initialize_schema().await?;
        backend.check_schema_version().await?;
        Ok(backend)
    }

    fn connect(&self) -> Result<Connection> {
        self.db.connect().map_err(|e| storage_error("failed to open connection", e))
    }

    async fn initialize_schema(&self) -> Result<()> {
        info!("initializing memory-storage schema");
        let conn = self.connect()?;

        for stmt in [
            schema::CREATE_MEMORIES_TABLE,
            schema::CREATE_MEMORIES_SCOPE_INDEX,
            schema::CREATE_MEMORIES_CREATED_AT_INDEX,
            schema::CREATE_TAG_INDEX_TABLE,
            schema::CREATE_TAG_INDEX_TAG_INDEX,
            schema::CREATE_RELATIONSHIPS_TABLE,
            schema::CREATE_RELATIONSHIPS_B_INDEX,
            schema::CREATE_AGING_PROFILES_TABLE,
            schema::CREATE_AGING_PROFILES_NEXT_EVAL_INDEX,
            schema::CREATE_META_TABLE,
            fts5_schema::CREATE_MEMORIES_FTS_TABLE,
        ] {
            conn.execute(stmt, ()).await.map_err(|e| storage_error("failed to apply schema", e))?;
        }
        // FTS5 triggers are three CREATE TRIGGER statements in one string;
        // execute_batch runs all of them against the same connection.
        conn.execute_batch(fts5_schema::CREATE_MEMORIES_FTS_TRIGGERS)
            .await
            .map_err(|e| storage_error("failed to install fts triggers", e))?;

        info!("schema initialization complete");
        Ok(())
    }

    async fn check_schema_version(&self) -> Result<()> {
        let conn = self.connect()?;
        let mut rows = conn
            .query("SELECT value FROM meta WHERE key = 'schema_version'", ())
            .await
            .map_err(|e| storage_error("failed to read schema version", e))?;

        if let Some(row) = rows.next().await.map_err(|e| storage_error("failed to read schema version row", e))? {
            let found: String = row.get(0).map_err(|e| storage_error("failed to decode schema version", e))?;
            let found: i64 = found
                .parse()
                .map_err(|e| Error::Internal(format!("corrupt schema_version value: {e}")))?;
            if found != SCHEMA_VERSION {
                return Err(Error::SchemaMismatch {
                    found,
                    expected: SCHEMA_VERSION,
                });
            }
        } else {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?)",
                libsql::params![SCHEMA_VERSION.to_string()],
            )
            .await
            .map_err(|e| storage_error("failed to record schema version", e))?;
        }
        Ok(())
    }

    fn row_to_memory(row: &libsql::Row) -> Result<Memory> {
        let id: String = row.get(0).map_err(|e| storage_error("decoding memory id", e))?;
        let content: String = row.get(1).map_err(|e| storage_error("decoding memory content", e))?;
        let tier: String = row.get(2).map_err(|e| storage_error("decoding memory tier", e))?;
        let scope: String = row.get(3).map_err(|e| storage_error("decoding memory scope", e))?;
        let project_id: Option<String> = row.get(4).ok();
        let tags_json: String = row.get(5).map_err(|e| storage_error("decoding memory tags", e))?;
        let metadata_json: String = row.get(6).map_err(|e| storage_error("decoding memory metadata", e))?;
        let created_at: i64 = row.get(7).map_err(|e| storage_error("decoding memory created_at", e))?;
        let accessed_at: i64 = row.get(8).map_err(|e| storage_error("decoding memory accessed_at", e))?;
        let access_count: i64 = row.get(9).map_err(|e| storage_error("decoding memory access_count", e))?;
        let content_size_bytes: i64 = row.get(10).map_err(|e| storage_error("decoding memory size", e))?;
        let is_compressed: i64 = row.get(11).map_err(|e| storage_error("decoding memory compressed flag", e))?;
        let priority: i64 = row.get(12).map_err(|e| storage_error("decoding memory priority", e))?;

        Ok(Memory {
            id: id.parse().map_err(|e| Error::Internal(format!("corrupt memory id {id}: {e}")))?,
            content,
            tier: parse_tier(&tier)?,
            scope: parse_scope(&scope)?,
            project_id,
            tags: serde_json::from_str(&tags_json).map_err(Error::Serialization)?,
            metadata: serde_json::from_str(&metadata_json).map_err(Error::Serialization)?,
            created_at: timestamp_to_utc(created_at)?,
            accessed_at: timestamp_to_utc(accessed_at)?,
            access_count: access_count.try_into().unwrap_or(0),
            content_size_bytes: content_size_bytes.try_into().unwrap_or(0),
            is_compressed: is_compressed != 0,
            priority: u8::try_from(priority).unwrap_or(5),
        })
    }

    fn row_to_relationship(row: &libsql::Row) -> Result<Relationship> {
        let a_id: String = row.get(0).map_err(|e| storage_error("decoding relationship a_id", e))?;
        let b_id: String = row.get(1).map_err(|e| storage_error("decoding relationship b_id", e))?;
        let strength: f64 = row.get(2).map_err(|e| storage_error("decoding relationship strength", e))?;
        Ok(Relationship {
            a_id: a_id.parse().map_err(|e| Error::Internal(format!("corrupt relationship a_id: {e}")))?,
            b_id: b_id.parse().map_err(|e| Error::Internal(format!("corrupt relationship b_id: {e}")))?,
            strength: strength as f32,
        })
    }

    fn row_to_aging_profile(row: &libsql::Row) -> Result<AgingProfile> {
        let memory_id: String = row.get(0).map_err(|e| storage_error("decoding aging memory_id", e))?;
        let content_class: String = row.get(1).map_err(|e| storage_error("decoding aging content_class", e))?;
        let aging_rate: f64 = row.get(2).map_err(|e| storage_error("decoding aging rate", e))?;
        let half_life_days: f64 = row.get(3).map_err(|e| storage_error("decoding aging half life", e))?;
        let composite_score: f64 = row.get(4).map_err(|e| storage_error("decoding aging composite score", e))?;
        let phase: String = row.get(5).map_err(|e| storage_error("decoding aging phase", e))?;
        let next_evaluation_at: i64 = row.get(6).map_err(|e| storage_error("decoding aging next evaluation", e))?;

        Ok(AgingProfile {
            memory_id: memory_id.parse().map_err(|e| Error::Internal(format!("corrupt aging memory_id: {e}")))?,
            content_class: parse_content_class(&content_class)?,
            aging_rate: aging_rate as f32,
            half_life_days: half_life_days as f32,
            composite_score: composite_score as f32,
            phase: parse_phase(&phase)?,
            next_evaluation_at: timestamp_to_utc(next_evaluation_at)?,
        })
    }

    async fn replace_tag_index(&self, conn: &Connection, memory: &Memory) -> Result<()> {
        conn.execute(
            "DELETE FROM tag_index WHERE memory_id = ?",
            libsql::params![memory.id.to_string()],
        )
        .await
        .map_err(|e| storage_error("failed to clear tag index", e))?;

        for tag in &memory.tags {
            conn.execute(
                "INSERT OR IGNORE INTO tag_index (tag, memory_id) VALUES (?, ?)",
                libsql::params![tag.clone(), memory.id.to_string()],
            )
            .await
            .map_err(|e| storage_error("failed to update tag index", e))?;
        }
        Ok(())
    }
}

fn parse_tier(s: &str) -> Result<Tier> {
    match s {
        "core" => Ok(Tier::Core),
        "longterm" => Ok(Tier::Longterm),
        other => Err(Error::Internal(format!("corrupt tier value {other:?}"))),
    }
}

fn parse_scope(s: &str) -> Result<Scope> {
    match s {
        "global" => Ok(Scope::Global),
        "project" => Ok(Scope::Project),
        other => Err(Error::Internal(format!("corrupt scope value {other:?}"))),
    }
}

fn parse_content_class(s: &str) -> Result<ContentClass> {
    match s {
        "code_snippet" => Ok(ContentClass::CodeSnippet),
        "configuration" => Ok(ContentClass::Configuration),
        "documentation" => Ok(ContentClass::Documentation),
        "user_preference" => Ok(ContentClass::UserPreference),
        "project_context" => Ok(ContentClass::ProjectContext),
        "temporary_note" => Ok(ContentClass::TemporaryNote),
        "system_state" => Ok(ContentClass::SystemState),
        "learning_data" => Ok(ContentClass::LearningData),
        "reference_material" => Ok(ContentClass::ReferenceMaterial),
        "workflow_pattern" => Ok(ContentClass::WorkflowPattern),
        other => Err(Error::Internal(format!("corrupt content_class value {other:?}"))),
    }
}

fn content_class_to_str(c: ContentClass) -> &'static str {
    match c {
        ContentClass::CodeSnippet => "code_snippet",
        ContentClass::Configuration => "configuration",
        ContentClass::Documentation => "documentation",
        ContentClass::UserPreference => "user_preference",
        ContentClass::ProjectContext => "project_context",
        ContentClass::TemporaryNote => "temporary_note",
        ContentClass::SystemState => "system_state",
        ContentClass::LearningData => "learning_data",
        ContentClass::ReferenceMaterial => "reference_material",
        ContentClass::WorkflowPattern => "workflow_pattern",
    }
}

fn parse_phase(s: &str) -> Result<Phase> {
    match s {
        "fresh" => Ok(Phase::Fresh),
        "active" => Ok(Phase::Active),
        "stable" => Ok(Phase::Stable),
        "declining" => Ok(Phase::Declining),
        "dormant" => Ok(Phase::Dormant),
        "stale" => Ok(Phase::Stale),
        "deprecated" => Ok(Phase::Deprecated),
        other => Err(Error::Internal(format!("corrupt phase value {other:?}"))),
    }
}

fn phase_to_str(p: Phase) -> &'static str {
    match p {
        Phase::Fresh => "fresh",
        Phase::Active => "active",
        Phase::Stable => "stable",
        Phase::Declining => "declining",
        Phase::Dormant => "dormant",
        Phase::Stale => "stale",
        Phase::Deprecated => "deprecated",
    }
}

fn timestamp_to_utc(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::Internal(format!("corrupt timestamp {secs}")))
}

/// Build an FTS5 MATCH expression that matches any of `terms`, quoting each
/// as a phrase so punctuation inside a term can't break the query syntax.
fn fts_match_expr(terms: &[String]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[async_trait]
impl StorageBackend for LibsqlBackend {
    async fn put(&self, memory: &Memory) -> Result<()> {
        debug!(id = %memory.id, "storing memory");
        let conn = self.connect()?;

        let tags_json = serde_json::to_string(&memory.tags).map_err(Error::Serialization)?;
        let metadata_json = serde_json::to_string(&memory.metadata).map_err(Error::Serialization)?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO memories (
                id, content, tier, scope, project_id, tags, metadata,
                created_at, accessed_at, access_count, content_size_bytes,
                is_compressed, priority
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                memory.id.to_string(),
                memory.content.clone(),
                memory.tier.to_string(),
                memory.scope.to_string(),
                memory.project_id.clone(),
                tags_json,
                metadata_json,
                memory.created_at.timestamp(),
                memory.accessed_at.timestamp(),
                i64::try_from(memory.access_count).unwrap_or(i64::MAX),
                i64::try_from(memory.content_size_bytes).unwrap_or(i64::MAX),
                i64::from(memory.is_compressed),
                i64::from(memory.priority),
            ],
        )
        .await
        .map_err(|e| storage_error("failed to store memory", e))?;

        self.replace_tag_index(&conn, memory).await?;
        Ok(())
    }

    async fn get(&self, id: MemoryId) -> Result<Option<Memory>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, content, tier, scope, project_id, tags, metadata, created_at, \
                 accessed_at, access_count, content_size_bytes, is_compressed, priority \
                 FROM memories WHERE id = ?",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(|e| storage_error("failed to query memory", e))?;

        match rows.next().await.map_err(|e| storage_error("failed to fetch memory row", e))? {
            Some(row) => Ok(Some(Self::row_to_memory(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: MemoryId) -> Result<bool> {
        let conn = self.connect()?;
        let affected = conn
            .execute("DELETE FROM memories WHERE id = ?", libsql::params![id.to_string()])
            .await
            .map_err(|e| storage_error("failed to delete memory", e))?;

        conn.execute("DELETE FROM tag_index WHERE memory_id = ?", libsql::params![id.to_string()])
            .await
            .map_err(|e| storage_error("failed to clear tag index on delete", e))?;

        Ok(affected > 0)
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<Memory>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(tier) = filter.tier {
            clauses.push("tier = ?".to_string());
            params.push(tier.to_string().into());
        }
        if let Some(scope) = filter.scope {
            clauses.push("scope = ?".to_string());
            params.push(scope.to_string().into());
        }
        if let Some(project_id) = &filter.project_id {
            clauses.push("project_id = ?".to_string());
            params.push(project_id.clone().into());
        }
        if let Some(since) = filter.since {
            clauses.push("created_at >= ?".to_string());
            params.push(since.timestamp().into());
        }

        let sql = if let Some(tag) = &filter.tag {
            params.push(tag.clone().into());
            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!(" AND {}", clauses.join(" AND "))
            };
            format!(
                "SELECT m.id, m.content, m.tier, m.scope, m.project_id, m.tags, m.metadata, \
                 m.created_at, m.accessed_at, m.access_count, m.content_size_bytes, \
                 m.is_compressed, m.priority \
                 FROM memories m JOIN tag_index t ON t.memory_id = m.id \
                 WHERE t.tag = ?{where_clause}"
            )
        } else {
            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };
            format!(
                "SELECT id, content, tier, scope, project_id, tags, metadata, created_at, \
                 accessed_at, access_count, content_size_bytes, is_compressed, priority \
                 FROM memories{where_clause}"
            )
        };

        let conn = self.connect()?;
        let mut rows = conn
            .query(&sql, params)
            .await
            .map_err(|e| storage_error("failed to scan memories", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_error("failed to fetch scan row", e))? {
            out.push(Self::row_to_memory(&row)?);
        }
        Ok(out)
    }

    async fn term_index_lookup(&self, terms: &[String]) -> Result<Vec<MemoryId>> {
        let Some(expr) = fts_match_expr(terms) else {
            return Ok(Vec::new());
        };
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT memory_id FROM memories_fts WHERE memories_fts MATCH ?",
                libsql::params![expr],
            )
            .await
            .map_err(|e| storage_error("failed to query term index", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_error("failed to fetch term index row", e))? {
            let id: String = row.get(0).map_err(|e| storage_error("decoding term index memory_id", e))?;
            out.push(id.parse().map_err(|e| Error::Internal(format!("corrupt term index memory_id: {e}")))?);
        }
        Ok(out)
    }

    async fn tag_index_lookup(&self, tag: &str) -> Result<Vec<MemoryId>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query("SELECT memory_id FROM tag_index WHERE tag = ?", libsql::params![tag.to_string()])
            .await
            .map_err(|e| storage_error("failed to query tag index", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_error("failed to fetch tag index row", e))? {
            let id: String = row.get(0).map_err(|e| storage_error("decoding tag index memory_id", e))?;
            out.push(id.parse().map_err(|e| Error::Internal(format!("corrupt tag index memory_id: {e}")))?);
        }
        Ok(out)
    }

    async fn record_access(&self, id: MemoryId, at: DateTime<Utc>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE memories SET accessed_at = ?, access_count = access_count + 1 WHERE id = ?",
            libsql::params![at.timestamp(), id.to_string()],
        )
        .await
        .map_err(|e| storage_error("failed to record access", e))?;
        Ok(())
    }

    async fn put_relationship(&self, relationship: &Relationship) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO relationships (a_id, b_id, strength) VALUES (?, ?, ?)",
            libsql::params![
                relationship.a_id.to_string(),
                relationship.b_id.to_string(),
                f64::from(relationship.strength),
            ],
        )
        .await
        .map_err(|e| storage_error("failed to store relationship", e))?;
        Ok(())
    }

    async fn relationships_for(&self, id: MemoryId) -> Result<Vec<Relationship>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT a_id, b_id, strength FROM relationships WHERE a_id = ? OR b_id = ?",
                libsql::params![id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| storage_error("failed to query relationships", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_error("failed to fetch relationship row", e))?
        {
            out.push(Self::row_to_relationship(&row)?);
        }
        Ok(out)
    }

    async fn delete_relationships_touching(&self, id: MemoryId) -> Result<u64> {
        let conn = self.connect()?;
        let affected = conn
            .execute(
                "DELETE FROM relationships WHERE a_id = ? OR b_id = ?",
                libsql::params![id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| storage_error("failed to delete relationships", e))?;
        Ok(affected)
    }

    async fn put_aging_profile(&self, profile: &AgingProfile) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO aging_profiles (
                memory_id, content_class, aging_rate, half_life_days,
                composite_score, phase, next_evaluation_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                profile.memory_id.to_string(),
                content_class_to_str(profile.content_class),
                f64::from(profile.aging_rate),
                f64::from(profile.half_life_days),
                f64::from(profile.composite_score),
                phase_to_str(profile.phase),
                profile.next_evaluation_at.timestamp(),
            ],
        )
        .await
        .map_err(|e| storage_error("failed to store aging profile", e))?;
        Ok(())
    }

    async fn get_aging_profile(&self, id: MemoryId) -> Result<Option<AgingProfile>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT memory_id, content_class, aging_rate, half_life_days, composite_score, \
                 phase, next_evaluation_at FROM aging_profiles WHERE memory_id = ?",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(|e| storage_error("failed to query aging profile", e))?;

        match rows
            .next()
            .await
            .map_err(|e| storage_error("failed to fetch aging profile row", e))?
        {
            Some(row) => Ok(Some(Self::row_to_aging_profile(&row)?)),
            None => Ok(None),
        }
    }

    async fn due_aging_profiles(&self, as_of: DateTime<Utc>) -> Result<Vec<AgingProfile>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT memory_id, content_class, aging_rate, half_life_days, composite_score, \
                 phase, next_evaluation_at FROM aging_profiles WHERE next_evaluation_at <= ?",
                libsql::params![as_of.timestamp()],
            )
            .await
            .map_err(|e| storage_error("failed to query due aging profiles", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_error("failed to fetch due aging profile row", e))?
        {
            out.push(Self::row_to_aging_profile(&row)?);
        }
        Ok(out)
    }

    async fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM memories", ())
            .await
            .map_err(|e| storage_error("failed to count memories", e))?;

        match rows.next().await.map_err(|e| storage_error("failed to fetch count row", e))? {
            Some(row) => {
                let count: i64 = row.get(0).map_err(|e| storage_error("decoding count", e))?;
                Ok(count.try_into().unwrap_or(0))
            }
            None => {
                warn!("COUNT(*) returned no rows");
                Ok(0)
            }
        }
    }
}

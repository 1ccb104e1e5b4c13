//! The `Engine`: wires Scope & Identity, Core Cache, the Storage Backend
//! trait, the Relevance & Aging Engine, the Query Engine, and Dedup &
//! Relationships into the seven operations the dispatcher exposes. No
//! hidden singletons — every handler goes through this context, per
//! `spec.md` §9.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::aging::{self, AgingInput};
use crate::api::{
    DeleteOutcome, DuplicateCandidateView, DuplicateCheckOutcome, MemoryAnalytics, MemoryStats, MigrateOutcome,
    SearchMemoryRequest, SearchResult, StoreMemoryRequest,
};
use crate::cache::CoreCache;
use crate::config::EngineConfig;
use crate::constants::{DEFAULT_PRIORITY, DEFAULT_QUERY_LIMIT};
use crate::dedup::{self, DuplicateCheck};
use crate::error::{Error, Result};
use crate::identity::{self, IdGenerator};
use crate::lifecycle::WorkspaceLru;
use crate::query::{self, CandidateDoc};
use crate::storage::{ScanFilter, StorageBackend};
use crate::types::{Memory, MemoryId, MigrationRecommendation, Phase, Relationship, Scope, Tier};

/// Metadata an in-cache (tier = core) memory needs beyond what
/// `CoreCache::Block` tracks, so the engine can assemble a full `Memory`
/// view without the cache module knowing about scope routing.
#[derive(Debug, Clone)]
struct CoreMeta {
    scope: Scope,
    project_id: Option<String>,
    created_at: DateTime<Utc>,
    metadata: HashMap<String, serde_json::Value>,
}

/// Opens a long-term backend for a given on-disk path. Injected by the
/// binary crate (`memory-mcp`/`memory-cli`) so `memory-core` never
/// depends on a concrete database crate.
pub type BackendOpener = Arc<dyn Fn(&std::path::Path) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// The engine context threaded through every request handler.
pub struct Engine {
    config: EngineConfig,
    id_gen: IdGenerator,
    core_cache: Mutex<CoreCache>,
    core_meta: Mutex<HashMap<MemoryId, CoreMeta>>,
    global_backend: Arc<dyn StorageBackend>,
    project_backends: WorkspaceLru,
    opener: BackendOpener,
    known_projects: Mutex<HashSet<String>>,
    last_cleanup_at: Mutex<Option<DateTime<Utc>>>,
}

impl Engine {
    /// Build a new engine. `global_backend` is opened once up front;
    /// per-project backends are opened lazily via `opener` and bounded by
    /// `config.workspace_lru_capacity`.
    #[must_use]
    pub fn new(config: EngineConfig, global_backend: Arc<dyn StorageBackend>, opener: BackendOpener) -> Self {
        let cache_config = config.cache_config();
        Self {
            project_backends: WorkspaceLru::new(config.workspace_lru_capacity),
            config,
            id_gen: IdGenerator,
            core_cache: Mutex::new(CoreCache::new(cache_config)),
            core_meta: Mutex::new(HashMap::new()),
            global_backend,
            opener,
            known_projects: Mutex::new(HashSet::new()),
            last_cleanup_at: Mutex::new(None),
        }
    }

    fn resolve_project_slug(&self, raw_project_id: &str) -> String {
        let known: Vec<String> = self.known_projects.lock().iter().cloned().collect();
        if let Some(existing) = identity::find_fuzzy_match(raw_project_id, known.iter().map(String::as_str)) {
            return existing.to_string();
        }
        identity::normalize_project_id(raw_project_id)
    }

    fn backend_for(&self, scope: Scope, project_id: Option<&str>) -> Result<(Arc<dyn StorageBackend>, Option<String>)> {
        match scope {
            Scope::Global => Ok((Arc::clone(&self.global_backend), None)),
            Scope::Project => {
                let raw = project_id.ok_or_else(|| {
                    Error::InvalidParams("project_id is required when scope = project".to_string())
                })?;
                if raw.trim().is_empty() {
                    return Err(Error::InvalidParams("project_id must not be empty".to_string()));
                }
                let normalized = self.resolve_project_slug(raw);
                let slug = identity::project_slug(&normalized);
                self.known_projects.lock().insert(normalized.clone());
                let opener = Arc::clone(&self.opener);
                let root = self.config.storage_root.clone();
                let slug_for_open = slug.clone();
                let backend = self.project_backends.get_or_open(&slug, move || {
                    let path = std::path::Path::new(&root).join("projects").join(format!("{slug_for_open}.db"));
                    (*opener)(&path)
                })?;
                Ok((backend, Some(normalized)))
            }
        }
    }

    fn peek_core_memory(&self, id: MemoryId) -> Option<Memory> {
        let cache = self.core_cache.lock();
        let block = cache.peek(id)?.clone();
        let content = cache.peek_content(id).ok().flatten()?;
        drop(cache);
        let meta = self.core_meta.lock().get(&id).cloned()?;
        Some(Memory {
            id,
            content,
            tier: Tier::Core,
            scope: meta.scope,
            project_id: meta.project_id,
            tags: block.tags,
            metadata: meta.metadata,
            created_at: meta.created_at,
            accessed_at: Utc::now(),
            access_count: block.access_count,
            content_size_bytes: block.size_bytes(),
            is_compressed: block.is_compressed(),
            priority: block.priority,
        })
    }

    fn core_candidates_for(&self, scope: Option<Scope>, project_id: Option<&str>) -> Vec<(MemoryId, String)> {
        let ids: Vec<MemoryId> = self.core_meta.lock().keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.peek_core_memory(id))
            .filter(|m| scope.is_none_or(|s| m.scope == s))
            .filter(|m| project_id.is_none_or(|p| m.project_id.as_deref() == Some(p)))
            .map(|m| (m.id, m.content))
            .collect()
    }

    /// `store_memory`: validate, deduplicate (unless overridden), persist
    /// to the resolved tier/backend, infer relationships, and compute an
    /// initial aging profile.
    ///
    /// # Errors
    ///
    /// `Error::InvalidParams`, `Error::TooLarge`, `Error::Conflict`,
    /// `Error::StorageUnavailable`.
    pub async fn store_memory(&self, req: StoreMemoryRequest) -> Result<MemoryId> {
        if req.content.is_empty() {
            return Err(Error::InvalidParams("content must not be empty".to_string()));
        }
        if req.scope == Scope::Project && req.project_id.as_deref().is_none_or(str::is_empty) {
            return Err(Error::InvalidParams("project_id is required when scope = project".to_string()));
        }

        let (backend, normalized_project) = self.backend_for(req.scope, req.project_id.as_deref())?;
        let tags: HashSet<String> = req.tags.into_iter().collect();

        let existing: Vec<(MemoryId, String)> = match req.tier {
            Tier::Core => self.core_candidates_for(Some(req.scope), normalized_project.as_deref()),
            Tier::Longterm => {
                let filter = ScanFilter {
                    tier: Some(Tier::Longterm),
                    scope: Some(req.scope),
                    project_id: normalized_project.clone(),
                    tag: None,
                    since: None,
                };
                backend
                    .scan(&filter)
                    .await?
                    .into_iter()
                    .map(|m| (m.id, m.content))
                    .collect()
            }
        };

        if !req.allow_duplicate {
            let check = dedup::check_duplicates(
                &req.content,
                &existing,
                self.config.default_similarity_threshold,
                5,
            );
            if let DuplicateCheck::Duplicate(candidates) = check {
                let first = candidates[0];
                return Err(Error::Conflict(format!(
                    "content is {:.0}% similar to existing memory {}",
                    first.similarity * 100.0,
                    first.id
                )));
            }
        }

        let id = self.id_gen.next();
        let now = Utc::now();

        match req.tier {
            Tier::Core => {
                let mut cache = self.core_cache.lock();
                cache.edit(id, &req.content, DEFAULT_PRIORITY, tags.clone())?;
                drop(cache);
                self.core_meta.lock().insert(
                    id,
                    CoreMeta {
                        scope: req.scope,
                        project_id: normalized_project.clone(),
                        created_at: now,
                        metadata: req.metadata.clone(),
                    },
                );
            }
            Tier::Longterm => {
                let memory = Memory {
                    id,
                    content: req.content.clone(),
                    tier: Tier::Longterm,
                    scope: req.scope,
                    project_id: normalized_project.clone(),
                    tags: tags.clone(),
                    metadata: req.metadata.clone(),
                    created_at: now,
                    accessed_at: now,
                    access_count: 0,
                    content_size_bytes: req.content.len() as u64,
                    is_compressed: false,
                    priority: DEFAULT_PRIORITY,
                };
                backend.put(&memory).await?;
            }
        }

        for edge in dedup::infer_relationships(id, &req.content, &existing) {
            backend.put_relationship(&edge).await?;
        }

        let profile = aging::generate_aging_profile(
            id,
            &AgingInput {
                content: &req.content,
                tags: &tags,
                scope: req.scope,
                tier: req.tier,
                created_at: now,
                now,
                access_count: 0,
                recent_accesses: &[],
                current_context: None,
                related: &[],
            },
        );
        backend.put_aging_profile(&profile).await?;

        tracing::info!(memory_id = %id, tier = %req.tier, scope = %req.scope, "stored memory");
        Ok(id)
    }

    /// `search_memory`: rank candidates from the core cache and the
    /// resolved long-term backend(s), record access on every returned
    /// memory, and return them with score and match type.
    ///
    /// # Errors
    ///
    /// `Error::InvalidParams`, `Error::StorageUnavailable`.
    pub async fn search_memory(&self, req: SearchMemoryRequest) -> Result<Vec<SearchResult>> {
        let limit = req.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if limit > crate::constants::MAX_QUERY_LIMIT {
            return Err(Error::InvalidParams(format!(
                "limit must be <= {}",
                crate::constants::MAX_QUERY_LIMIT
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut pool: Vec<Memory> = Vec::new();

        if req.tier.is_none_or(|t| t == Tier::Core) {
            let ids: Vec<MemoryId> = self.core_meta.lock().keys().copied().collect();
            for id in ids {
                if let Some(m) = self.peek_core_memory(id) {
                    pool.push(m);
                }
            }
        }

        if req.tier.is_none_or(|t| t == Tier::Longterm) {
            if req.scope.is_none_or(|s| s == Scope::Global) {
                let filter = ScanFilter {
                    tier: Some(Tier::Longterm),
                    scope: Some(Scope::Global),
                    project_id: None,
                    tag: req.tag.clone(),
                    since: None,
                };
                pool.extend(self.global_backend.scan(&filter).await?);
            }
            if req.scope.is_none_or(|s| s == Scope::Project) {
                if let Some(project_id) = req.project_id.as_deref() {
                    let (backend, normalized) = self.backend_for(Scope::Project, Some(project_id))?;
                    let filter = ScanFilter {
                        tier: Some(Tier::Longterm),
                        scope: Some(Scope::Project),
                        project_id: normalized,
                        tag: req.tag.clone(),
                        since: None,
                    };
                    pool.extend(backend.scan(&filter).await?);
                }
            }
        }

        if let Some(scope) = req.scope {
            pool.retain(|m| m.scope == scope);
        }
        if let Some(tag) = &req.tag {
            pool.retain(|m| m.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)));
        }

        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        for memory in &pool {
            let tokens: HashSet<String> = query::tokenize(&memory.content).into_iter().collect();
            for t in tokens {
                *doc_freq.entry(t).or_insert(0) += 1;
            }
        }
        let corpus_size = pool.len();

        let candidates: Vec<CandidateDoc> = pool
            .iter()
            .map(|m| CandidateDoc {
                id: m.id,
                content: m.content.clone(),
                tags: m.tags.clone(),
                priority: m.priority,
                access_count: m.access_count,
                accessed_at: m.accessed_at,
            })
            .collect();

        let ranked = query::rank_candidates(&req.query, &candidates, Some((&doc_freq, corpus_size)), limit);

        let by_id: HashMap<MemoryId, &Memory> = pool.iter().map(|m| (m.id, m)).collect();
        let mut results = Vec::with_capacity(ranked.len());
        for scored in ranked {
            let Some(memory) = by_id.get(&scored.id) else { continue };
            let mut memory = (*memory).clone();
            self.record_access(&mut memory).await?;
            results.push(SearchResult {
                memory,
                score: scored.score,
                match_type: scored.match_type,
            });
        }
        Ok(results)
    }

    async fn record_access(&self, memory: &mut Memory) -> Result<()> {
        let now = Utc::now();
        match memory.tier {
            Tier::Core => {
                let mut cache = self.core_cache.lock();
                cache.get(memory.id).ok();
                if let Some(block) = cache.peek(memory.id) {
                    memory.access_count = block.access_count;
                }
                memory.accessed_at = now;
            }
            Tier::Longterm => {
                let (backend, _) = self.backend_for(memory.scope, memory.project_id.as_deref())?;
                backend.record_access(memory.id, now).await?;
                memory.accessed_at = now;
                memory.access_count += 1;
            }
        }
        Ok(())
    }

    /// `get_memory_stats`: aggregate counts across the core cache, the
    /// global backend, and every currently open project backend.
    ///
    /// # Errors
    ///
    /// `Error::StorageUnavailable`.
    pub async fn get_memory_stats(&self) -> Result<MemoryStats> {
        let mut per_tier: HashMap<String, u64> = HashMap::new();
        let mut per_scope: HashMap<String, u64> = HashMap::new();
        let mut tag_counts: HashMap<String, u64> = HashMap::new();
        let mut total_bytes: u64 = 0;

        {
            let cache = self.core_cache.lock();
            let core_count = cache.len() as u64;
            total_bytes += cache.total_bytes();
            drop(cache);
            *per_tier.entry("core".to_string()).or_insert(0) += core_count;
        }
        let core_scopes: Vec<Scope> = self.core_meta.lock().values().map(|m| m.scope).collect();
        for scope in core_scopes {
            *per_scope.entry(scope.to_string()).or_insert(0) += 1;
        }

        let global_count = self.global_backend.count().await?;
        *per_tier.entry("longterm".to_string()).or_insert(0) += global_count;
        *per_scope.entry("global".to_string()).or_insert(0) += global_count;

        let global_memories = self.global_backend.scan(&ScanFilter::default()).await?;
        for m in &global_memories {
            total_bytes += m.content_size_bytes;
            for tag in &m.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        let active_projects: Vec<String> = self.known_projects.lock().iter().cloned().collect();
        for project_id in &active_projects {
            let (backend, _) = self.backend_for(Scope::Project, Some(project_id))?;
            let count = backend.count().await?;
            *per_tier.entry("longterm".to_string()).or_insert(0) += count;
            *per_scope.entry("project".to_string()).or_insert(0) += count;
            let memories = backend.scan(&ScanFilter::default()).await?;
            for m in &memories {
                total_bytes += m.content_size_bytes;
                for tag in &m.tags {
                    *tag_counts.entry(tag.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut top_tags: Vec<(String, u64)> = tag_counts.into_iter().collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(10);

        let total_count = per_tier.values().sum();

        Ok(MemoryStats {
            total_count,
            total_bytes,
            per_tier,
            per_scope,
            top_tags,
            active_projects,
            last_cleanup_at: *self.last_cleanup_at.lock(),
        })
    }

    /// `delete_memory`: remove the target, and when `cascade = true`,
    /// every memory connected to it by a relationship edge at or above the
    /// cascade-delete floor.
    ///
    /// # Errors
    ///
    /// `Error::NotFound`, `Error::InvalidParams`, `Error::StorageUnavailable`.
    pub async fn delete_memory(&self, id: MemoryId, cascade: bool) -> Result<DeleteOutcome> {
        let memory = self.find_memory(id).await?.ok_or(Error::NotFound(id))?;
        let (backend, _) = self.backend_for(memory.scope, memory.project_id.as_deref())?;

        let edges = match memory.tier {
            Tier::Core => Vec::new(),
            Tier::Longterm => backend.relationships_for(id).await?,
        };

        let mut related_deleted = None;
        if cascade {
            let targets = dedup::cascade_delete_targets(id, &edges);
            let mut count = 0u64;
            for target in &targets {
                if self.remove_one(*target).await? {
                    count += 1;
                }
            }
            related_deleted = Some(count);
        }

        let deleted = self.remove_one(id).await?;
        backend.delete_relationships_touching(id).await?;

        let message = match (deleted, related_deleted) {
            (true, Some(n)) => format!("deleted memory {id} and {n} related memories"),
            (true, None) => format!("deleted memory {id}"),
            (false, _) => format!("memory {id} was already absent"),
        };

        Ok(DeleteOutcome {
            deleted,
            related_deleted,
            message,
        })
    }

    async fn remove_one(&self, id: MemoryId) -> Result<bool> {
        if self.core_meta.lock().remove(&id).is_some() {
            let removed = self.core_cache.lock().delete(id);
            return Ok(removed);
        }
        if let Some(memory) = self.find_memory(id).await? {
            let (backend, _) = self.backend_for(memory.scope, memory.project_id.as_deref())?;
            let removed = backend.delete(id).await?;
            backend.delete_relationships_touching(id).await?;
            return Ok(removed);
        }
        Ok(false)
    }

    async fn find_memory(&self, id: MemoryId) -> Result<Option<Memory>> {
        if self.core_meta.lock().contains_key(&id) {
            return Ok(self.peek_core_memory(id));
        }
        if let Some(memory) = self.global_backend.get(id).await? {
            return Ok(Some(memory));
        }
        let known: Vec<String> = self.known_projects.lock().iter().cloned().collect();
        for project_id in known {
            let (backend, _) = self.backend_for(Scope::Project, Some(&project_id))?;
            if let Some(memory) = backend.get(id).await? {
                return Ok(Some(memory));
            }
        }
        Ok(None)
    }

    /// `check_duplicate_memory`: score `content` against existing memories
    /// in the resolved `(tier, scope, project_id)` without writing
    /// anything.
    ///
    /// # Errors
    ///
    /// `Error::InvalidParams`, `Error::StorageUnavailable`.
    pub async fn check_duplicate_memory(
        &self,
        content: &str,
        tier: Option<Tier>,
        scope: Option<Scope>,
        project_id: Option<&str>,
        similarity_threshold: Option<f32>,
    ) -> Result<DuplicateCheckOutcome> {
        let threshold = similarity_threshold.unwrap_or(self.config.default_similarity_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidParams("similarity_threshold must be in [0, 1]".to_string()));
        }

        let tier = tier.unwrap_or(Tier::Longterm);
        let existing: Vec<(MemoryId, String)> = match tier {
            Tier::Core => self.core_candidates_for(scope, project_id),
            Tier::Longterm => {
                let (backend, normalized) = match scope {
                    Some(Scope::Project) => self.backend_for(Scope::Project, project_id)?,
                    _ => (Arc::clone(&self.global_backend), None),
                };
                let filter = ScanFilter {
                    tier: Some(Tier::Longterm),
                    scope,
                    project_id: normalized,
                    tag: None,
                    since: None,
                };
                backend
                    .scan(&filter)
                    .await?
                    .into_iter()
                    .map(|m| (m.id, m.content))
                    .collect()
            }
        };

        let check = dedup::check_duplicates(content, &existing, threshold, 5);
        let (is_duplicate, duplicates) = match check {
            DuplicateCheck::Unique => (false, Vec::new()),
            DuplicateCheck::Duplicate(candidates) => {
                (true, candidates.into_iter().map(DuplicateCandidateView::from).collect())
            }
        };
        let recommendation = if is_duplicate {
            "merge tags/metadata into the existing memory, or pass allow_duplicate=true to insert anyway".to_string()
        } else {
            "safe to store".to_string()
        };

        Ok(DuplicateCheckOutcome {
            is_duplicate,
            duplicates,
            recommendation,
        })
    }

    /// `migrate_memory_tier`: move a memory between core and long-term,
    /// preserving content, tags, and metadata.
    ///
    /// # Errors
    ///
    /// `Error::NotFound`, `Error::TooLarge` (on promote), `Error::InvalidParams`.
    pub async fn migrate_memory_tier(&self, id: MemoryId, target_tier: Tier, reason: Option<String>) -> Result<MigrateOutcome> {
        let memory = self.find_memory(id).await?.ok_or(Error::NotFound(id))?;
        let from_tier = memory.tier;
        if from_tier == target_tier {
            return Ok(MigrateOutcome {
                migrated: false,
                from_tier,
                to_tier: target_tier,
                message: format!("memory {id} is already in tier {target_tier}"),
            });
        }

        match target_tier {
            Tier::Core => {
                let mut cache = self.core_cache.lock();
                cache.edit(id, &memory.content, memory.priority, memory.tags.clone())?;
                drop(cache);
                self.core_meta.lock().insert(
                    id,
                    CoreMeta {
                        scope: memory.scope,
                        project_id: memory.project_id.clone(),
                        created_at: memory.created_at,
                        metadata: memory.metadata.clone(),
                    },
                );
                let (backend, _) = self.backend_for(memory.scope, memory.project_id.as_deref())?;
                backend.delete(id).await?;
            }
            Tier::Longterm => {
                let (backend, normalized_project) = self.backend_for(memory.scope, memory.project_id.as_deref())?;
                let now = Utc::now();
                let persisted = Memory {
                    tier: Tier::Longterm,
                    project_id: normalized_project,
                    accessed_at: now,
                    ..memory.clone()
                };
                backend.put(&persisted).await?;
                self.core_meta.lock().remove(&id);
                self.core_cache.lock().delete(id);
            }
        }

        tracing::info!(memory_id = %id, from = %from_tier, to = %target_tier, reason = reason.as_deref().unwrap_or(""), "migrated memory tier");

        Ok(MigrateOutcome {
            migrated: true,
            from_tier,
            to_tier: target_tier,
            message: format!("migrated memory {id} from {from_tier} to {target_tier}"),
        })
    }

    /// `get_memory_analytics`: access patterns, tier distribution, and
    /// cheap optimization hints derived from freshly computed aging
    /// profiles.
    ///
    /// # Errors
    ///
    /// `Error::StorageUnavailable`.
    pub async fn get_memory_analytics(&self) -> Result<MemoryAnalytics> {
        let stats = self.get_memory_stats().await?;
        let mut access_by_class: HashMap<String, u64> = HashMap::new();
        let mut phase_distribution: HashMap<String, u64> = HashMap::new();
        let mut optimization_hints = Vec::new();
        let now = Utc::now();

        let mut all_memories: Vec<Memory> = Vec::new();
        let core_ids: Vec<MemoryId> = self.core_meta.lock().keys().copied().collect();
        for id in core_ids {
            if let Some(m) = self.peek_core_memory(id) {
                all_memories.push(m);
            }
        }
        all_memories.extend(self.global_backend.scan(&ScanFilter::default()).await?);
        let project_ids: Vec<String> = self.known_projects.lock().iter().cloned().collect();
        for project_id in project_ids {
            let (backend, _) = self.backend_for(Scope::Project, Some(&project_id))?;
            all_memories.extend(backend.scan(&ScanFilter::default()).await?);
        }

        let mut demote_candidates = 0u64;
        let mut promote_candidates = 0u64;
        for memory in &all_memories {
            let profile = aging::generate_aging_profile(
                memory.id,
                &AgingInput {
                    content: &memory.content,
                    tags: &memory.tags,
                    scope: memory.scope,
                    tier: memory.tier,
                    created_at: memory.created_at,
                    now,
                    access_count: memory.access_count,
                    recent_accesses: &[],
                    current_context: None,
                    related: &[],
                },
            );
            *access_by_class
                .entry(format!("{:?}", profile.content_class))
                .or_insert(0) += memory.access_count;
            *phase_distribution.entry(format!("{:?}", profile.phase)).or_insert(0) += 1;
            match aging::recommend_migration(memory.tier, &profile) {
                MigrationRecommendation::Demote => demote_candidates += 1,
                MigrationRecommendation::Promote => promote_candidates += 1,
                MigrationRecommendation::None => {}
            }
            if profile.phase == Phase::Stale {
                optimization_hints.push(format!("memory {} is stale and a delete candidate", memory.id));
            }
        }
        if demote_candidates > 0 {
            optimization_hints.push(format!("{demote_candidates} core-tier memories recommend demotion to long-term"));
        }
        if promote_candidates > 0 {
            optimization_hints.push(format!("{promote_candidates} long-term memories recommend promotion to core"));
        }

        Ok(MemoryAnalytics {
            access_by_class,
            phase_distribution,
            tier_distribution: stats.per_tier,
            optimization_hints,
        })
    }

    /// Run any maintenance tasks that are currently due, via `scheduler`.
    /// Returns the tasks that were executed, for logging/testing.
    pub async fn run_due_maintenance(&self, scheduler: &crate::lifecycle::MaintenanceScheduler) -> Vec<crate::lifecycle::MaintenanceTask> {
        use crate::lifecycle::MaintenanceTask;
        let now = Utc::now();
        let due = scheduler.due(now);
        for task in &due {
            match task {
                MaintenanceTask::ResourceSample => {
                    let bytes = self.core_cache.lock().total_bytes();
                    tracing::debug!(cache_bytes = bytes, open_backends = self.project_backends.len(), "resource sample");
                }
                MaintenanceTask::IdleWorkspaceCleanup => {
                    *self.last_cleanup_at.lock() = Some(now);
                    tracing::debug!("idle workspace cleanup sweep");
                }
                MaintenanceTask::AgingSweep => {}
            }
            scheduler.reschedule(*task, now);
        }
        due
    }

    /// Copy every on-disk database file into `<storage_root>/backups/` with
    /// a timestamp suffix. The maintenance loop calls this on the
    /// idle-workspace-cleanup cadence; `memory-cli` also exposes it as a
    /// manual command. Returns the destination paths written.
    ///
    /// # Errors
    ///
    /// `Error::Io` if creating the backups directory or copying a file fails.
    pub async fn backup_now(&self) -> Result<Vec<std::path::PathBuf>> {
        let root = std::path::Path::new(&self.config.storage_root);
        let backups_dir = root.join("backups");
        tokio::fs::create_dir_all(&backups_dir).await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S%.3f");

        let mut sources = vec![root.join("memory").join("global.db")];
        let known: Vec<String> = self.known_projects.lock().iter().cloned().collect();
        for project_id in &known {
            let slug = identity::project_slug(project_id);
            sources.push(root.join("projects").join(format!("{slug}.db")));
        }

        let mut copied = Vec::new();
        for source in sources {
            if tokio::fs::metadata(&source).await.is_err() {
                continue;
            }
            let file_name = source.file_name().and_then(|n| n.to_str()).unwrap_or("backup.db");
            let dest = backups_dir.join(format!("{file_name}.{timestamp}"));
            tokio::fs::copy(&source, &dest).await?;
            copied.push(dest);
        }

        tracing::info!(count = copied.len(), "completed manual backup");
        Ok(copied)
    }

    /// Apply relationship decay, lazily, to every edge touching `id` based
    /// on elapsed days since last write; used before reading relationship
    /// strengths for relevance boosting.
    pub fn decay_edges(&self, edges: &[Relationship], last_reinforced: &HashMap<(MemoryId, MemoryId), DateTime<Utc>>) -> Vec<Relationship> {
        let now = Utc::now();
        edges
            .iter()
            .map(|e| {
                let key = (e.a_id, e.b_id);
                let days = last_reinforced
                    .get(&key)
                    .map(|ts| (now - *ts).num_seconds() as f32 / 86_400.0)
                    .unwrap_or(0.0);
                Relationship {
                    strength: dedup::decay_strength(e.strength, days),
                    ..*e
                }
            })
            .collect()
    }
}

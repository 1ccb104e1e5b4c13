//! libSQL-backed implementation of `memory_core::storage::StorageBackend`.
//!
//! Exposes one database per scope domain: `memory/global.db` for
//! `Scope::Global` and `projects/<slug>.db` per project, matching
//! `spec.md` §6's persisted state layout bit-exact. `memory-core` never
//! depends on this crate directly; callers wire it in via
//! `memory_core::BackendOpener`.

pub mod backend;
mod error;
pub mod fts5_schema;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use backend::LibsqlBackend;
use memory_core::storage::StorageBackend;
use memory_core::{BackendOpener, Result};

/// Open the global (scope-wide) database under
/// `storage_root/memory/global.db`.
///
/// # Errors
///
/// Propagates `LibsqlBackend::open`'s errors.
pub async fn open_global(storage_root: &Path) -> Result<Arc<dyn StorageBackend>> {
    let path = storage_root.join("memory").join("global.db");
    let backend = LibsqlBackend::open(&path).await?;
    Ok(Arc::new(backend))
}

/// Build a `BackendOpener` that opens `storage_root/projects/<slug>.db`,
/// creating the `projects/` directory and the file on first use.
///
/// The returned closure is synchronous (matching `BackendOpener`'s
/// signature) but internally blocks on async I/O via
/// `tokio::task::block_in_place` + `Handle::block_on`. Callers must
/// therefore run this within a multi-threaded tokio runtime; the engine
/// only invokes it from `memory-mcp`'s server loop, which is built on one.
#[must_use]
pub fn project_opener(storage_root: PathBuf) -> BackendOpener {
    Arc::new(move |project_path: &Path| -> Result<Arc<dyn StorageBackend>> {
        let path = storage_root.join(project_path);
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(move || {
            handle.block_on(async move {
                let backend = LibsqlBackend::open(&path).await?;
                Ok(Arc::new(backend) as Arc<dyn StorageBackend>)
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_core::storage::ScanFilter;
    use memory_core::types::{Memory, MemoryId, Scope, Tier};
    use std::collections::{HashMap, HashSet};

    fn sample_memory(id: MemoryId) -> Memory {
        let now = chrono::Utc::now();
        Memory {
            id,
            content: "fn main() {}".to_string(),
            tier: Tier::Longterm,
            scope: Scope::Global,
            project_id: None,
            tags: HashSet::from(["rust".to_string()]),
            metadata: HashMap::new(),
            created_at: now,
            accessed_at: now,
            access_count: 0,
            content_size_bytes: 12,
            is_compressed: false,
            priority: 5,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        let memory = sample_memory(MemoryId::new());
        backend.put(&memory).await.unwrap();

        let fetched = backend.get(memory.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, memory.content);
        assert_eq!(fetched.tags, memory.tags);
    }

    #[tokio::test]
    async fn delete_removes_memory_and_tag_index() {
        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        let memory = sample_memory(MemoryId::new());
        backend.put(&memory).await.unwrap();

        assert!(backend.delete(memory.id).await.unwrap());
        assert!(backend.get(memory.id).await.unwrap().is_none());
        assert!(backend.tag_index_lookup("rust").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn term_index_lookup_finds_matching_content() {
        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        let memory = sample_memory(MemoryId::new());
        backend.put(&memory).await.unwrap();

        let hits = backend.term_index_lookup(&["main".to_string()]).await.unwrap();
        assert!(hits.contains(&memory.id));

        let misses = backend.term_index_lookup(&["nonexistent".to_string()]).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn scan_filters_by_tag() {
        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        let tagged = sample_memory(MemoryId::new());
        let mut untagged = sample_memory(MemoryId::new());
        untagged.tags.clear();
        backend.put(&tagged).await.unwrap();
        backend.put(&untagged).await.unwrap();

        let filter = ScanFilter {
            tag: Some("rust".to_string()),
            ..ScanFilter::default()
        };
        let results = backend.scan(&filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, tagged.id);
    }

    #[tokio::test]
    async fn record_access_bumps_count_and_timestamp() {
        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        let memory = sample_memory(MemoryId::new());
        backend.put(&memory).await.unwrap();

        let later = memory.accessed_at + chrono::Duration::seconds(60);
        backend.record_access(memory.id, later).await.unwrap();

        let fetched = backend.get(memory.id).await.unwrap().unwrap();
        assert_eq!(fetched.access_count, 1);
        assert_eq!(fetched.accessed_at.timestamp(), later.timestamp());
    }

    #[tokio::test]
    async fn relationships_round_trip_and_delete() {
        use memory_core::types::Relationship;

        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        let a = MemoryId::new();
        let b = MemoryId::new();
        let relationship = Relationship::new(a, b, 0.9).unwrap();
        backend.put_relationship(&relationship).await.unwrap();

        let found = backend.relationships_for(a).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strength, 0.9);

        let removed = backend.delete_relationships_touching(b).await.unwrap();
        assert_eq!(removed, 1);
        assert!(backend.relationships_for(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn aging_profile_round_trips_and_reports_due() {
        use memory_core::types::{AgingProfile, ContentClass, Phase};

        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        let id = MemoryId::new();
        let past = chrono::Utc::now() - chrono::Duration::days(1);
        let profile = AgingProfile {
            memory_id: id,
            content_class: ContentClass::CodeSnippet,
            aging_rate: 0.4,
            half_life_days: 14.0,
            composite_score: 0.6,
            phase: Phase::Active,
            next_evaluation_at: past,
        };
        backend.put_aging_profile(&profile).await.unwrap();

        let fetched = backend.get_aging_profile(id).await.unwrap().unwrap();
        assert_eq!(fetched.content_class, ContentClass::CodeSnippet);
        assert_eq!(fetched.phase, Phase::Active);

        let due = backend.due_aging_profiles(chrono::Utc::now()).await.unwrap();
        assert!(due.iter().any(|p| p.memory_id == id));
    }

    #[tokio::test]
    async fn count_reflects_stored_memories() {
        let backend = LibsqlBackend::open_in_memory().await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 0);
        backend.put(&sample_memory(MemoryId::new())).await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn schema_mismatch_is_detected_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versioned.db");
        {
            let backend = LibsqlBackend::open(&path).await.unwrap();
            drop(backend);
        }

        // Simulate an older/newer build having written a different version.
        let db = libsql::Builder::new_local(&path).build().await.unwrap();
        let conn = db.connect().unwrap();
        conn.execute("UPDATE meta SET value = '999' WHERE key = 'schema_version'", ())
            .await
            .unwrap();
        drop(conn);
        drop(db);

        let reopened = LibsqlBackend::open(&path).await;
        assert!(matches!(reopened, Err(memory_core::Error::SchemaMismatch { found: 999, .. })));
    }
}

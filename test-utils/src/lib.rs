//! Shared fixtures for exercising the tiered memory engine in tests:
//! a ready-to-use in-memory `Engine`, and builders for the common
//! request shapes, so integration tests across `memory-mcp`/`memory-cli`
//! don't each re-derive engine wiring.

use std::collections::HashMap;
use std::sync::Arc;

use memory_core::api::StoreMemoryRequest;
use memory_core::config::EngineConfig;
use memory_core::{BackendOpener, Engine, Scope, Tier};
use memory_storage::LibsqlBackend;
use tempfile::TempDir;

/// Build an `Engine` backed by an in-memory global database and a
/// temp-directory project opener. The returned `TempDir` must be kept
/// alive for as long as the engine is used; dropping it removes the
/// directory project backends are opened from.
///
/// # Panics
///
/// Panics if the temp directory or in-memory database cannot be created,
/// since test setup failures should fail loudly rather than be handled.
pub async fn in_memory_engine() -> (Arc<Engine>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir for test engine");
    let config = EngineConfig {
        storage_root: dir.path().to_string_lossy().to_string(),
        ..EngineConfig::default()
    };
    let global = Arc::new(
        LibsqlBackend::open_in_memory()
            .await
            .expect("open in-memory global backend"),
    );
    let opener = project_opener_for(dir.path().to_path_buf());
    let engine = Arc::new(Engine::new(config, global, opener));
    (engine, dir)
}

fn project_opener_for(storage_root: std::path::PathBuf) -> BackendOpener {
    memory_storage::project_opener(storage_root)
}

/// A minimal, valid `store_memory` request for `content`, defaulting to
/// `(Tier::Longterm, Scope::Global)` with no tags or metadata.
#[must_use]
pub fn sample_store_request(content: &str) -> StoreMemoryRequest {
    StoreMemoryRequest {
        content: content.to_string(),
        tier: Tier::Longterm,
        scope: Scope::Global,
        project_id: None,
        tags: Vec::new(),
        metadata: HashMap::new(),
        allow_duplicate: false,
    }
}

/// A `store_memory` request scoped to a project, with the given tags.
#[must_use]
pub fn sample_project_store_request(content: &str, project_id: &str, tags: &[&str]) -> StoreMemoryRequest {
    StoreMemoryRequest {
        content: content.to_string(),
        tier: Tier::Longterm,
        scope: Scope::Project,
        project_id: Some(project_id.to_string()),
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
        metadata: HashMap::new(),
        allow_duplicate: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_engine_accepts_a_store_request() {
        let (engine, _dir) = in_memory_engine().await;
        let id = engine.store_memory(sample_store_request("hello world")).await.unwrap();
        let stats = engine.get_memory_stats().await.unwrap();
        assert_eq!(stats.total_count, 1);
        drop(id);
    }

    #[tokio::test]
    async fn sample_project_store_request_round_trips_through_the_engine() {
        let (engine, _dir) = in_memory_engine().await;
        let req = sample_project_store_request("deploy notes", "widgets-api", &["deploy"]);
        let id = engine.store_memory(req).await.unwrap();
        let results = engine
            .search_memory(memory_core::api::SearchMemoryRequest {
                query: "deploy".to_string(),
                tier: None,
                scope: Some(Scope::Project),
                project_id: Some("widgets-api".to_string()),
                tag: None,
                limit: None,
            })
            .await
            .unwrap();
        assert!(results.iter().any(|r| r.memory.id == id));
    }
}

//! End-to-end coverage of the dispatcher wired to real `memory-storage`
//! backends (a temp-dir global db plus the project opener), exercising
//! every method in `spec.md` §6's table at least once.

use std::sync::Arc;

use memory_core::config::EngineConfig;
use memory_core::Engine;
use memory_mcp::jsonrpc::JsonRpcRequest;
use memory_mcp::Dispatcher;
use serde_json::{json, Value};
use tempfile::tempdir;

async fn build_dispatcher(storage_root: &std::path::Path) -> Dispatcher {
    let config = EngineConfig {
        storage_root: storage_root.to_string_lossy().to_string(),
        ..EngineConfig::default()
    };
    let global = memory_storage::open_global(storage_root).await.unwrap();
    let opener = memory_storage::project_opener(storage_root.to_path_buf());
    let engine = Arc::new(Engine::new(config, global, opener));
    Dispatcher::new(engine)
}

fn req(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        id: Some(Value::from(id)),
        method: method.to_string(),
        params: Some(params),
    }
}

#[tokio::test]
async fn full_method_surface_round_trips() {
    let dir = tempdir().unwrap();
    let dispatcher = build_dispatcher(dir.path()).await;

    let store = dispatcher
        .dispatch(req(
            1,
            "store_memory",
            json!({
                "content": "the deploy pipeline retries three times before paging",
                "tier": "longterm",
                "scope": "project",
                "project_id": "infra-tools",
                "tags": ["deploy", "runbook"],
            }),
        ))
        .await
        .unwrap();
    assert!(store.error.is_none(), "{:?}", store.error);
    let id = store.result.unwrap()["id"].as_str().unwrap().to_string();

    let stats = dispatcher.dispatch(req(2, "get_memory_stats", Value::Null)).await.unwrap();
    assert!(stats.error.is_none());
    assert_eq!(stats.result.unwrap()["total_count"], json!(1));

    let search = dispatcher
        .dispatch(req(3, "search_memory", json!({"query": "deploy pipeline"})))
        .await
        .unwrap();
    assert!(search.error.is_none());
    assert!(!search.result.unwrap()["results"].as_array().unwrap().is_empty());

    let dup = dispatcher
        .dispatch(req(
            4,
            "check_duplicate_memory",
            json!({
                "content": "the deploy pipeline retries three times before paging",
                "scope": "project",
                "project_id": "infra-tools",
            }),
        ))
        .await
        .unwrap();
    assert!(dup.error.is_none());
    assert_eq!(dup.result.unwrap()["is_duplicate"], json!(true));

    let migrate = dispatcher
        .dispatch(req(
            5,
            "migrate_memory_tier",
            json!({"id": id, "target_tier": "core", "confirm": true}),
        ))
        .await
        .unwrap();
    assert!(migrate.error.is_none(), "{:?}", migrate.error);
    assert_eq!(migrate.result.unwrap()["migrated"], json!(true));

    let analytics = dispatcher.dispatch(req(6, "get_memory_analytics", Value::Null)).await.unwrap();
    assert!(analytics.error.is_none());

    let delete = dispatcher
        .dispatch(req(7, "delete_memory", json!({"id": id, "confirm": true})))
        .await
        .unwrap();
    assert!(delete.error.is_none(), "{:?}", delete.error);
    assert_eq!(delete.result.unwrap()["deleted"], json!(true));
}

#[tokio::test]
async fn search_limit_above_max_is_invalid_params() {
    let dir = tempdir().unwrap();
    let dispatcher = build_dispatcher(dir.path()).await;
    let response = dispatcher
        .dispatch(req(1, "search_memory", json!({"query": "x", "limit": 500})))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn project_scope_without_project_id_is_invalid_params() {
    let dir = tempdir().unwrap();
    let dispatcher = build_dispatcher(dir.path()).await;
    let response = dispatcher
        .dispatch(req(
            1,
            "store_memory",
            json!({"content": "x", "tier": "longterm", "scope": "project"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

//! Library surface behind the `memory-cli` binary: storage bootstrap and
//! the `--workspace` scope-injection wrapper, split out so integration
//! tests can exercise them without spawning the binary.

use std::path::Path;
use std::sync::Arc;

use memory_core::config::EngineConfig;
use memory_core::Engine;
use memory_mcp::jsonrpc::JsonRpcRequest;
use serde_json::{json, Value};

/// Open the global backend and a project opener rooted at
/// `config.storage_root`, creating the directory if it doesn't exist yet,
/// and build the engine around them.
///
/// # Errors
///
/// Propagates any I/O or schema error opening the global backend.
pub async fn bootstrap_engine(config: EngineConfig) -> anyhow::Result<Arc<Engine>> {
    let storage_root = Path::new(&config.storage_root).to_path_buf();
    std::fs::create_dir_all(&storage_root)?;
    let global_backend = memory_storage::open_global(&storage_root).await?;
    let opener = memory_storage::project_opener(storage_root);
    Ok(Arc::new(Engine::new(config, global_backend, opener)))
}

/// The wire methods that take `scope`/`project_id` params and so can
/// inherit a CLI-wide `--workspace` default.
fn accepts_workspace_scope(method: &str) -> bool {
    matches!(method, "store_memory" | "search_memory" | "check_duplicate_memory")
}

/// Fill in `scope: "project"` and `project_id: <workspace>` on requests
/// that accept them and didn't already set their own, so that
/// `--workspace=<path>` sets the initial project scope for every request
/// issued over this CLI session. Requests that already specify `scope` or
/// `project_id` are left alone.
#[must_use]
pub fn apply_workspace_scope(mut request: JsonRpcRequest, workspace_project_id: Option<&str>) -> JsonRpcRequest {
    let Some(project_id) = workspace_project_id else {
        return request;
    };
    if !accepts_workspace_scope(&request.method) {
        return request;
    }
    let mut params = match request.params.take() {
        Some(Value::Object(map)) => map,
        Some(other) => {
            request.params = Some(other);
            return request;
        }
        None => serde_json::Map::new(),
    };
    params.entry("scope".to_string()).or_insert_with(|| json!("project"));
    params.entry("project_id".to_string()).or_insert_with(|| json!(project_id));
    request.params = Some(Value::Object(params));
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn no_workspace_leaves_request_untouched() {
        let req = request("store_memory", None);
        let rewritten = apply_workspace_scope(req, None);
        assert!(rewritten.params.is_none());
    }

    #[test]
    fn workspace_fills_in_missing_scope_and_project_id() {
        let req = request("search_memory", Some(json!({"query": "notes"})));
        let rewritten = apply_workspace_scope(req, Some("widgets-api"));
        let params = rewritten.params.unwrap();
        assert_eq!(params["scope"], json!("project"));
        assert_eq!(params["project_id"], json!("widgets-api"));
        assert_eq!(params["query"], json!("notes"));
    }

    #[test]
    fn workspace_does_not_override_explicit_scope() {
        let req = request(
            "search_memory",
            Some(json!({"query": "notes", "scope": "global"})),
        );
        let rewritten = apply_workspace_scope(req, Some("widgets-api"));
        assert_eq!(rewritten.params.unwrap()["scope"], json!("global"));
    }

    #[test]
    fn workspace_scope_is_not_applied_to_unrelated_methods() {
        let req = request("get_memory_stats", None);
        let rewritten = apply_workspace_scope(req, Some("widgets-api"));
        assert!(rewritten.params.is_none());
    }
}

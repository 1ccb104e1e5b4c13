//! Routes JSON-RPC requests onto `Engine`'s seven operations: validates
//! argument shape, enforces per-method rate limits and confirmation
//! gating for destructive methods, applies the request deadline, and
//! maps `memory_core::Error` onto the wire error taxonomy (`spec.md` §7).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use memory_core::api::{SearchMemoryRequest, StoreMemoryRequest};
use memory_core::constants::REQUEST_DEADLINE_SECS;
use memory_core::{Engine, Error, MemoryId, Scope, Tier};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::rate_limit::{Method, RateLimiter};

/// Methods that mutate durable state destructively enough to require the
/// caller assert `confirm: true`, per `spec.md` §4.7.
fn requires_confirmation(method: &str) -> bool {
    matches!(method, "delete_memory" | "migrate_memory_tier")
}

fn invalid_params(message: impl Into<String>) -> Error {
    Error::InvalidParams(message.into())
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<&Value>) -> Result<T, Error> {
    let value = params.cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| invalid_params(format!("malformed params: {e}")))
}

fn parse_memory_id(raw: &str) -> Result<MemoryId, Error> {
    MemoryId::from_str(raw).map_err(|e| invalid_params(format!("invalid id: {e}")))
}

#[derive(Deserialize)]
struct StoreMemoryParams {
    content: String,
    tier: Tier,
    scope: Scope,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    #[serde(default)]
    allow_duplicate: bool,
}

#[derive(Deserialize)]
struct SearchMemoryParams {
    query: String,
    #[serde(default)]
    tier: Option<Tier>,
    #[serde(default)]
    scope: Option<Scope>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct DeleteMemoryParams {
    id: String,
    #[serde(default)]
    cascade_related: bool,
}

#[derive(Deserialize)]
struct CheckDuplicateMemoryParams {
    content: String,
    #[serde(default)]
    tier: Option<Tier>,
    #[serde(default)]
    scope: Option<Scope>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    similarity_threshold: Option<f32>,
}

#[derive(Deserialize)]
struct MigrateMemoryTierParams {
    id: String,
    target_tier: Tier,
    #[serde(default)]
    reason: Option<String>,
}

/// Maps an `Error` onto a JSON-RPC error code/message/data triple. Codes
/// below `-32000` follow the JSON-RPC 2.0 reserved range; application
/// errors live in `-32001..-32010`, one per taxonomy kind.
fn map_error(err: &Error) -> JsonRpcError {
    let code = match err {
        Error::InvalidParams(_) | Error::Serialization(_) => -32602,
        Error::NotFound(_) => -32001,
        Error::Conflict(_) => -32002,
        Error::TooLarge(_) => -32003,
        Error::CacheFull(_) => -32004,
        Error::StorageUnavailable(_) | Error::Io(_) => -32005,
        Error::SchemaMismatch { .. } => -32006,
        Error::RateLimited(_) => -32007,
        Error::Cancelled => -32008,
        Error::Internal(_) | Error::Configuration(_) => -32603,
    };
    JsonRpcError::new(code, err.to_string()).with_data(json!({ "kind": err.kind() }))
}

/// Routes requests to `Engine` and owns the per-method rate limiter.
pub struct Dispatcher {
    engine: Arc<Engine>,
    rate_limiter: RateLimiter,
}

impl Dispatcher {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            rate_limiter: RateLimiter::new(),
        }
    }

    /// Handle one request, returning `None` for notifications (`id` absent
    /// or null), per JSON-RPC 2.0's notification contract.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.id.is_none() || matches!(request.id, Some(Value::Null)) {
            return None;
        }
        let id = request.id.clone();

        let Some(method) = Method::from_name(&request.method) else {
            return Some(JsonRpcResponse::failure(id, JsonRpcError::method_not_found(&request.method)));
        };

        let limit = self.rate_limiter.check(method);
        if !limit.allowed {
            let err = Error::RateLimited(format!(
                "method {} exceeded {} requests/sec",
                request.method, limit.limit
            ));
            let mut jr = map_error(&err);
            jr.data = Some(json!({
                "kind": err.kind(),
                "retry_after_ms": limit.retry_after.as_millis(),
                "limit": limit.limit,
            }));
            return Some(JsonRpcResponse::failure(id, jr));
        }

        if requires_confirmation(&request.method) {
            let confirmed = request
                .params
                .as_ref()
                .and_then(|p| p.get("confirm"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !confirmed {
                let err = invalid_params(format!(
                    "{} is destructive; pass confirm=true to proceed",
                    request.method
                ));
                return Some(JsonRpcResponse::failure(id, map_error(&err)));
            }
        }

        let outcome = tokio::time::timeout(
            Duration::from_secs(REQUEST_DEADLINE_SECS),
            self.route(&request.method, request.params.as_ref()),
        )
        .await
        .unwrap_or(Err(Error::Cancelled));

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(id, map_error(&err)),
        })
    }

    async fn route(&self, method: &str, params: Option<&Value>) -> Result<Value, Error> {
        match method {
            "store_memory" => {
                let p: StoreMemoryParams = parse_params(params)?;
                let req = StoreMemoryRequest {
                    content: p.content,
                    tier: p.tier,
                    scope: p.scope,
                    project_id: p.project_id,
                    tags: p.tags,
                    metadata: p.metadata,
                    allow_duplicate: p.allow_duplicate,
                };
                let id = self.engine.store_memory(req).await?;
                Ok(json!({ "id": id }))
            }
            "search_memory" => {
                let p: SearchMemoryParams = parse_params(params)?;
                let req = SearchMemoryRequest {
                    query: p.query,
                    tier: p.tier,
                    scope: p.scope,
                    project_id: p.project_id,
                    tag: p.tag,
                    limit: p.limit,
                };
                let results = self.engine.search_memory(req).await?;
                Ok(json!({ "results": results }))
            }
            "get_memory_stats" => {
                let stats = self.engine.get_memory_stats().await?;
                serde_json::to_value(stats).map_err(Error::Serialization)
            }
            "delete_memory" => {
                let p: DeleteMemoryParams = parse_params(params)?;
                let id = parse_memory_id(&p.id)?;
                let outcome = self.engine.delete_memory(id, p.cascade_related).await?;
                serde_json::to_value(outcome).map_err(Error::Serialization)
            }
            "check_duplicate_memory" => {
                let p: CheckDuplicateMemoryParams = parse_params(params)?;
                let outcome = self
                    .engine
                    .check_duplicate_memory(&p.content, p.tier, p.scope, p.project_id.as_deref(), p.similarity_threshold)
                    .await?;
                serde_json::to_value(outcome).map_err(Error::Serialization)
            }
            "migrate_memory_tier" => {
                let p: MigrateMemoryTierParams = parse_params(params)?;
                let id = parse_memory_id(&p.id)?;
                let outcome = self.engine.migrate_memory_tier(id, p.target_tier, p.reason).await?;
                serde_json::to_value(outcome).map_err(Error::Serialization)
            }
            "get_memory_analytics" => {
                let analytics = self.engine.get_memory_analytics().await?;
                serde_json::to_value(analytics).map_err(Error::Serialization)
            }
            other => Err(Error::Internal(format!("unrouted method {other}"))),
        }
    }
}

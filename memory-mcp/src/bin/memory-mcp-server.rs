//! Stdio entry point. Reads `memory.toml`/`MEMORY_*` config, opens the
//! global libSQL backend plus a per-project opener, and runs the
//! line-delimited JSON-RPC loop against a `Dispatcher`.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memory_core::config::EngineConfig;
use memory_core::Engine;
use memory_mcp::jsonrpc::{read_line, write_line, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use memory_mcp::{maintenance, Dispatcher};

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(value) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(value));
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the JSON-RPC transport; all diagnostic output goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("starting memory-mcp-server in line-delimited JSON-RPC mode");

    let config_path = config_path_from_args();
    let config = EngineConfig::load(config_path.as_deref())?;

    let storage_root = Path::new(&config.storage_root);
    std::fs::create_dir_all(storage_root)?;
    let global_backend = memory_storage::open_global(storage_root).await?;
    let opener = memory_storage::project_opener(storage_root.to_path_buf());

    let engine = Arc::new(Engine::new(config, global_backend, opener));
    let dispatcher = Dispatcher::new(Arc::clone(&engine));
    let maintenance_handle = maintenance::spawn(Arc::clone(&engine));

    run_stdio_loop(&dispatcher).await?;

    maintenance_handle.abort();
    tracing::info!("memory-mcp-server shutting down");
    Ok(())
}

async fn run_stdio_loop(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut handle = stdin.lock();
    let mut stdout = io::stdout();

    loop {
        let line = match read_line(&mut handle) {
            Ok(None) => {
                tracing::info!("received EOF on stdin, shutting down");
                break;
            }
            Ok(Some(line)) => line,
            Err(e) => {
                tracing::error!("error reading from stdin: {e}");
                break;
            }
        };

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => dispatcher.dispatch(request).await,
            Err(e) => {
                tracing::warn!("failed to parse JSON-RPC request: {e}");
                Some(JsonRpcResponse::failure(None, JsonRpcError::parse_error(e)))
            }
        };

        if let Some(response) = response {
            let body = serde_json::to_string(&response)?;
            write_line(&mut stdout, &body)?;
        }
    }
    Ok(())
}

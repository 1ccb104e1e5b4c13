//! `memory-cli`: a standalone entry point for the tiered memory engine.
//! With no subcommand it runs the same line-delimited JSON-RPC dispatcher
//! loop as `memory-mcp-server`, optionally scoped to a project via
//! `--workspace`. `backup` triggers a one-off manual backup and exits.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use memory_cli::{apply_workspace_scope, bootstrap_engine};
use memory_core::config::EngineConfig;
use memory_core::identity::normalize_project_id;
use memory_mcp::jsonrpc::{read_line, write_line, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use memory_mcp::{maintenance, Dispatcher};

#[derive(Parser)]
#[command(name = "memory-cli", about = "Command-line entry point for the tiered memory engine", version)]
struct Cli {
    /// Project workspace root. Sets the initial project scope for
    /// subsequent requests issued over this session.
    #[arg(long, value_name = "PATH")]
    workspace: Option<PathBuf>,

    /// Configuration file path.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every open database file into `<storage_root>/backups/` now.
    Backup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout is the JSON-RPC transport in dispatcher mode; keep diagnostics
    // on stderr even for the `backup` subcommand, for consistency.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load(cli.config.as_deref())?;
    let engine = bootstrap_engine(config).await?;

    match cli.command {
        Some(Commands::Backup) => {
            let paths = engine.backup_now().await?;
            for path in &paths {
                println!("{}", path.display());
            }
            println!("wrote {} backup file(s)", paths.len());
            Ok(())
        }
        None => {
            let workspace_project_id = cli
                .workspace
                .as_ref()
                .map(|p| normalize_project_id(&p.to_string_lossy()));

            let dispatcher = Dispatcher::new(engine.clone());
            let maintenance_handle = maintenance::spawn(engine);

            run_stdio_loop(&dispatcher, workspace_project_id.as_deref()).await?;

            maintenance_handle.abort();
            Ok(())
        }
    }
}

async fn run_stdio_loop(dispatcher: &Dispatcher, workspace_project_id: Option<&str>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut handle = stdin.lock();
    let mut stdout = io::stdout();

    loop {
        let line = match read_line(&mut handle) {
            Ok(None) => break,
            Ok(Some(line)) => line,
            Err(e) => {
                tracing::error!("error reading from stdin: {e}");
                break;
            }
        };

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => {
                let request = apply_workspace_scope(request, workspace_project_id);
                dispatcher.dispatch(request).await
            }
            Err(e) => Some(JsonRpcResponse::failure(None, JsonRpcError::parse_error(e))),
        };

        if let Some(response) = response {
            let body = serde_json::to_string(&response)?;
            write_line(&mut stdout, &body)?;
        }
    }
    Ok(())
}

//! End-to-end tests driving the compiled `memory-cli` binary.

use std::io::Read;

use assert_cmd::Command;
use predicates::str::contains;

fn cli() -> Command {
    Command::cargo_bin("memory-cli").expect("memory-cli binary should build")
}

#[test]
fn backup_subcommand_writes_a_backup_file() {
    let dir = tempfile::tempdir().unwrap();

    cli()
        .env("MEMORY_STORAGE_ROOT", dir.path())
        .arg("backup")
        .assert()
        .success()
        .stdout(contains("wrote 1 backup file"));

    let backups_dir = dir.path().join("backups");
    let entries: Vec<_> = std::fs::read_dir(&backups_dir).unwrap().collect();
    assert_eq!(entries.len(), 1, "expected exactly one backed-up file, found {entries:?}");
}

#[test]
fn dispatcher_mode_stores_and_answers_over_stdio() {
    let dir = tempfile::tempdir().unwrap();

    let request = serde_json::json!({
        "id": 1,
        "method": "get_memory_stats",
        "params": null,
    });
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');

    let output = cli()
        .env("MEMORY_STORAGE_ROOT", dir.path())
        .write_stdin(line)
        .output()
        .expect("memory-cli should run to completion on stdin EOF");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let mut stdout = String::new();
    std::io::Cursor::new(&output.stdout).read_to_string(&mut stdout).unwrap();

    let response: serde_json::Value = serde_json::from_str(stdout.trim()).expect("one JSON-RPC response line");
    assert_eq!(response["id"], serde_json::json!(1));
    assert_eq!(response["result"]["total_count"], serde_json::json!(0));
}

#[test]
fn workspace_flag_scopes_store_and_search_to_that_project() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("widgets-api");

    let store = serde_json::json!({
        "id": 1,
        "method": "store_memory",
        "params": {"content": "use cargo nextest for faster test runs", "tier": "longterm"},
    });
    let search = serde_json::json!({
        "id": 2,
        "method": "search_memory",
        "params": {"query": "cargo nextest"},
    });
    let mut stdin = serde_json::to_string(&store).unwrap();
    stdin.push('\n');
    stdin.push_str(&serde_json::to_string(&search).unwrap());
    stdin.push('\n');

    let output = cli()
        .env("MEMORY_STORAGE_ROOT", dir.path())
        .arg("--workspace")
        .arg(&workspace)
        .write_stdin(stdin)
        .output()
        .expect("memory-cli should run to completion on stdin EOF");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut responses = stdout.lines();
    let store_response: serde_json::Value = serde_json::from_str(responses.next().unwrap()).unwrap();
    assert!(store_response["error"].is_null(), "store failed: {store_response}");

    let search_response: serde_json::Value = serde_json::from_str(responses.next().unwrap()).unwrap();
    let results = search_response["result"]["results"].as_array().expect("search result array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["memory"]["scope"], serde_json::json!("project"));
}

//! End-to-end tests driving the compiled `hre` binary against a BM25-only
//! configuration (no vector/graph backend, no LLM calls), exercising the
//! full init → ingest → search pipeline without any external services.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hre_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hre");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming and cargo crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and deep learning frameworks.",
    )
    .unwrap();

    let config_content = format!(
        r#"
        [db]
        path = "{0}/data/hre.sqlite"

        [server]
        bind = "127.0.0.1:0"

        [source]
        kind = "filesystem"

        [source.filesystem]
        paths = ["{0}/files"]
        include_globs = ["**/*.md"]

        [backends]
        vector = "none"
        graph = "none"
        search = "bm25"

        [graph]
        enable_knowledge_graph = false
        "#,
        root.display()
    );

    let config_path = config_dir.join("hre.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_hre(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hre_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run hre binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn init_creates_database() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, ok) = run_hre(&config_path, &["init"]);
    assert!(ok, "init failed: {stderr}");
    assert!(stdout.contains("initialized"));
}

#[test]
fn ingest_then_search_finds_relevant_document() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_hre(&config_path, &["init"]);
    assert!(ok, "init failed: {stderr}");

    let (stdout, stderr, ok) = run_hre(&config_path, &["ingest", "--quiet"]);
    assert!(ok, "ingest failed: {stderr}");
    let job: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(job["status"], "completed");
    assert_eq!(job["files_completed"], 2);

    let (stdout, stderr, ok) = run_hre(&config_path, &["search", "cargo crates rust"]);
    assert!(ok, "search failed: {stderr}");
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let results = results.as_array().unwrap();
    assert!(!results.is_empty(), "expected at least one search hit");
    assert_eq!(results[0]["file_name"], "alpha.md");

    drop(tmp);
}

#[test]
fn ingest_text_is_searchable_immediately() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_hre(&config_path, &["init"]);
    assert!(ok, "init failed: {stderr}");

    let (stdout, stderr, ok) = run_hre(
        &config_path,
        &[
            "ingest-text",
            "The quick brown fox jumps over the lazy dog in Springfield.",
            "--source-name",
            "pasted-note",
        ],
    );
    assert!(ok, "ingest-text failed: {stderr}");
    let job: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(job["status"], "completed");

    let (stdout, stderr, ok) = run_hre(&config_path, &["search", "fox Springfield"]);
    assert!(ok, "search failed: {stderr}");
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let results = results.as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["file_name"], "pasted-note");
}

#[test]
fn rejects_empty_query_config_is_still_valid_for_other_operations() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_hre(&config_path, &["init"]);
    assert!(ok, "init failed: {stderr}");

    // `sources` should succeed against a filesystem-backed config with no
    // live connection to validate beyond path existence.
    let (_stdout, stderr, ok) = run_hre(&config_path, &["sources"]);
    assert!(ok, "sources failed: {stderr}");
}

#[test]
fn search_before_ingest_returns_empty_results() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_hre(&config_path, &["init"]);
    assert!(ok, "init failed: {stderr}");

    let (stdout, stderr, ok) = run_hre(&config_path, &["search", "anything"]);
    assert!(ok, "search failed: {stderr}");
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(results.as_array().unwrap().is_empty());
}

#[test]
fn job_status_and_cancel_round_trip_for_unknown_job() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_hre(&config_path, &["init"]);
    assert!(ok, "init failed: {stderr}");

    let (_stdout, stderr, ok) = run_hre(&config_path, &["jobs", "status", "nonexistent-job-id"]);
    assert!(!ok, "expected failure for unknown job id, stderr: {stderr}");
}

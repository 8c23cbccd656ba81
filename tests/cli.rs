//! CLI tests that drive the built `dv` binary.
//!
//! Only commands that need no network credentials are exercised here;
//! ingestion and search run against in-memory collaborators in
//! `tests/pipeline.rs`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dv_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dv");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/dv.sqlite"

[storage]
bucket = "uploads"
endpoint_url = "http://localhost:9000"

[embedding]
model = "text-embedding-3-small"
dims = 1536

[chunking]
chunk_size = 1000
overlap = 200
"#,
        root.display()
    );

    let config_path = root.join("config").join("dv.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dv(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dv_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dv binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_dv(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("dv.sqlite").exists());
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_dv(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_dv(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn list_on_fresh_database_is_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_dv(&config_path, &["init"]);
    let (stdout, stderr, success) = run_dv(&config_path, &["list", "--owner", "1"]);
    assert!(success, "list failed: stderr={}", stderr);
    assert!(stdout.contains("No sources."));
}

#[test]
fn invalid_chunking_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("config").join("bad.toml");
    fs::write(
        &config_path,
        r#"[db]
path = "data/dv.sqlite"

[storage]
bucket = "uploads"

[embedding]
model = "text-embedding-3-small"
dims = 1536

[chunking]
chunk_size = 200
overlap = 200
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_dv(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"));
}

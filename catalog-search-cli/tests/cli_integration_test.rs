//! Integration tests for the catalog-search binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture_catalog() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/catalog.json")
}

/// Binary running in an empty directory with no API key, so the local model is used
fn catalog_search(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catalog-search").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("CATALOG_SEARCH_EMBEDDING_API_KEY")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// Catalog with one product whose description is too long to embed
fn catalog_with_oversized_product(dir: &TempDir) -> PathBuf {
    let content = std::fs::read_to_string(fixture_catalog()).unwrap();
    let mut products: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
    products.push(serde_json::json!({
        "id": "huge-1",
        "name": "Encyclopedia",
        "description": "a".repeat(32_001),
        "category": "Books",
        "price_cents": 1999
    }));
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, serde_json::to_string(&products).unwrap()).unwrap();
    path
}

#[test]
fn test_no_command_prints_help() {
    let dir = TempDir::new().unwrap();
    catalog_search(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_keyword_search_lists_matches() {
    let dir = TempDir::new().unwrap();
    catalog_search(&dir)
        .arg("--catalog")
        .arg(fixture_catalog())
        .args(["search", "laptop", "--mode", "keyword"])
        .assert()
        .success()
        .stdout(predicate::str::contains("laptop-1"))
        .stdout(predicate::str::contains("laptop-2"))
        .stdout(predicate::str::contains("desk-1").not());
}

#[test]
fn test_keyword_search_category_filter() {
    let dir = TempDir::new().unwrap();
    catalog_search(&dir)
        .arg("--catalog")
        .arg(fixture_catalog())
        .args(["search", "gaming", "--mode", "keyword", "--category", "accessories"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mouse-1"))
        .stdout(predicate::str::contains("laptop-1").not());
}

#[test]
fn test_search_json_output() {
    let dir = TempDir::new().unwrap();
    let output = catalog_search(&dir)
        .arg("--catalog")
        .arg(fixture_catalog())
        .args(["search", "standing desk", "--mode", "keyword", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["mode"], "keyword");
    assert_eq!(result["total_results"], 1);
    assert_eq!(result["products"][0]["id"], "desk-1");
}

#[test]
fn test_semantic_search_answers_from_local_model() {
    let dir = TempDir::new().unwrap();
    let output = catalog_search(&dir)
        .arg("--catalog")
        .arg(fixture_catalog())
        .args(["search", "gaming laptop", "--min-similarity", "0", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["mode"], "semantic");
    assert!(!result["products"].as_array().unwrap().is_empty());
}

#[test]
fn test_similar_excludes_source_product() {
    let dir = TempDir::new().unwrap();
    let output = catalog_search(&dir)
        .arg("--catalog")
        .arg(fixture_catalog())
        .args(["similar", "laptop-1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = result["products"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["id"].as_str())
        .collect();
    assert!(!ids.contains(&"laptop-1"));
}

#[test]
fn test_missing_catalog_is_an_error() {
    let dir = TempDir::new().unwrap();
    catalog_search(&dir)
        .args(["--catalog", "does-not-exist.json", "search", "laptop"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("loading catalog"));
}

#[test]
fn test_config_example() {
    let dir = TempDir::new().unwrap();
    catalog_search(&dir)
        .args(["config", "--example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("assistant_min_similarity"));
}

#[test]
fn test_config_hides_api_key() {
    let dir = TempDir::new().unwrap();
    catalog_search(&dir)
        .env("CATALOG_SEARCH_EMBEDDING_API_KEY", "sk-very-secret")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("sk-very-secret").not())
        .stdout(predicate::str::contains("set (hidden)"));
}

#[test]
fn test_index_clean_catalog() {
    let dir = TempDir::new().unwrap();
    let dead_letters = dir.path().join("dlq.json");
    catalog_search(&dir)
        .arg("--catalog")
        .arg(fixture_catalog())
        .arg("index")
        .arg("--dead-letters")
        .arg(&dead_letters)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("products indexed"))
        .stdout(predicate::str::contains("failed").not());
    assert!(!dead_letters.exists());
}

#[test]
fn test_index_dead_letters_then_jobs_and_sweep() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_with_oversized_product(&dir);
    let dead_letters = dir.path().join("dlq.json");

    catalog_search(&dir)
        .arg("--catalog")
        .arg(&catalog)
        .arg("index")
        .arg("--dead-letters")
        .arg(&dead_letters)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("products failed"));
    assert!(dead_letters.exists());

    let output = catalog_search(&dir)
        .arg("jobs")
        .arg("--dead-letters")
        .arg(&dead_letters)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["product_id"], "huge-1");
    assert_eq!(jobs[0]["attempts"], 1);

    catalog_search(&dir)
        .arg("--catalog")
        .arg(&catalog)
        .arg("sweep")
        .arg("--dead-letters")
        .arg(&dead_letters)
        .args(["--at", "2099-01-01T00:00:00Z"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Examined 1"))
        .stdout(predicate::str::contains("0 deferred"));

    let output = catalog_search(&dir)
        .arg("jobs")
        .arg("--dead-letters")
        .arg(&dead_letters)
        .args(["--status", "failed", "--format", "json"])
        .output()
        .unwrap();
    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["attempts"], 2);
    assert!(jobs[0]["retry_started_at"].is_null());
}

#[test]
fn test_jobs_without_file_is_empty() {
    let dir = TempDir::new().unwrap();
    catalog_search(&dir)
        .args(["jobs", "--dead-letters", "missing.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No dead-letter jobs."));
}

#[test]
fn test_metrics_reports_modes() {
    let dir = TempDir::new().unwrap();
    let output = catalog_search(&dir)
        .arg("--catalog")
        .arg(fixture_catalog())
        .args(["metrics", "laptop", "desk", "--mode", "keyword", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let keyword = report["modes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["mode"] == "keyword")
        .unwrap();
    assert_eq!(keyword["searches"], 2);
}

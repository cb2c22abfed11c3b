#![cfg(feature = "provider-api")] // Gate tests on provider-api feature
//! `sdgbench --action evaluate` against a mocked classification service.

use assert_cmd::Command;
use httpmock::{Method::POST, MockServer};
use rstest::{fixture, rstest};
use sdg_benchmark::run::{META_FILE, RESULTS_FILE, STATS_FILE};
use sdg_benchmark::{Config, RunStore};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;

const DATASET: &str = "text,sdg,label
Reduce income inequality within countries,10,True
Stock prices rose sharply,10,False
Cut greenhouse gas emissions,13,True
";

#[fixture]
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("create temp dir: {e}"));
    fs::write(dir.path().join("dataset.csv"), DATASET)
        .unwrap_or_else(|e| panic!("write dataset: {e}"));
    dir
}

fn write_registry(dir: &Path, endpoint: Option<&str>) -> PathBuf {
    let endpoint = endpoint.map_or_else(String::new, |url| format!("endpoint = \"{url}\"\n"));
    let registry = format!(
        r#"[[classifiers]]
name = "prompted"
storage_root = "prompted"
{endpoint}parameters = [{{ name = "model", description = "Chat model" }}]
configurations = [{{ model = "small" }}, {{ model = "large" }}]
"#
    );
    let path = dir.join("registry.toml");
    fs::write(&path, registry).unwrap_or_else(|e| panic!("write registry: {e}"));
    path
}

fn evaluate(dir: &Path, registry: &Path, configuration: &str) -> Output {
    Command::cargo_bin("sdgbench")
        .unwrap_or_else(|e| panic!("failed to locate sdgbench binary: {e}"))
        .env_remove("RUST_LOG")
        .arg("--registry")
        .arg(registry)
        .args(["--classifier", "prompted", "--action", "evaluate"])
        .args(["--configuration", configuration])
        .arg("--dataset")
        .arg(dir.join("dataset.csv"))
        .output()
        .unwrap_or_else(|e| panic!("failed to run sdgbench: {e}"))
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[rstest]
fn evaluation_saves_the_run_and_reuses_cached_replies(workspace: TempDir) {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/classify");
        then.status(200).json_body(json!({ "sdgs": [10] }));
    });
    let endpoint = format!("{}/classify", server.base_url());
    let registry = write_registry(workspace.path(), Some(&endpoint));

    let first = evaluate(workspace.path(), &registry, "2");
    assert_success(&first);
    mock.assert_hits(3);

    let large = Config::new([("model", json!("large"))]);
    let run_dir = workspace
        .path()
        .join("prompted")
        .join("runs")
        .join(large.identifier());
    for file in [META_FILE, STATS_FILE, RESULTS_FILE] {
        assert!(run_dir.join(file).is_file(), "{file} missing");
    }
    assert!(String::from_utf8_lossy(&first.stdout).contains("saved"));

    let run = RunStore::new(workspace.path().join("prompted").join("runs"))
        .load(&large)
        .unwrap_or_else(|e| panic!("load: {e}"))
        .unwrap_or_else(|| panic!("run should exist"));
    assert_eq!(run.stats.overall().n, 3);
    assert_eq!((run.stats.overall().tp, run.stats.overall().fp), (1, 1));

    let second = evaluate(workspace.path(), &registry, "2");
    assert_success(&second);
    mock.assert_hits(3);
}

#[rstest]
fn evaluation_without_an_endpoint_fails(workspace: TempDir) {
    let registry = write_registry(workspace.path(), None);
    let output = evaluate(workspace.path(), &registry, "1");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("NoEndpoint"), "stderr was: {stderr}");
    assert!(!workspace.path().join("prompted").join("runs").exists());
}

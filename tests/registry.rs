//! Loading the classifier registry from TOML.

use rstest::{fixture, rstest};
use sdg_benchmark::{Config, ConfigSet, Registry, RegistryError};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

#[fixture]
fn registry_dir() -> TempDir {
    tempfile::tempdir().unwrap_or_else(|e| panic!("create temp dir: {e}"))
}

fn write(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("registry.toml");
    fs::write(&path, content).unwrap_or_else(|e| panic!("write registry: {e}"));
    path
}

#[rstest]
fn loads_entries_in_order(registry_dir: TempDir) {
    let path = write(
        &registry_dir,
        r#"
[[classifiers]]
name = "prompted"
description = "Prompted chat model"
storage_root = "classifiers/prompted"
endpoint = "http://localhost:8080/classify"
parameters = [{ name = "model", description = "Chat model" }, { name = "temperature" }]
configurations = [{ model = "small", temperature = 0 }, { model = "large", temperature = 0.5 }]

[[classifiers]]
name = "keywords"
storage_root = "/srv/keywords"
"#,
    );
    let registry = Registry::from_toml_file(&path).unwrap_or_else(|e| panic!("load: {e}"));
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["prompted", "keywords"]);

    let prompted = registry.get("prompted").unwrap_or_else(|e| panic!("lookup: {e}"));
    assert_eq!(
        prompted.storage_root,
        registry_dir.path().join("classifiers/prompted")
    );
    assert_eq!(prompted.endpoint.as_deref(), Some("http://localhost:8080/classify"));
    assert_eq!(prompted.configurations.len(), 2);
    assert_eq!(
        prompted.configurations.get(1).ok(),
        Some(&Config::new([("model", json!("small")), ("temperature", json!(0))]))
    );
    assert_eq!(
        prompted.configurations.parameters().describe("temperature"),
        Some("")
    );

    let keywords = registry.get("keywords").unwrap_or_else(|e| panic!("lookup: {e}"));
    assert_eq!(keywords.storage_root, std::path::PathBuf::from("/srv/keywords"));
    assert_eq!(keywords.configurations, ConfigSet::single_default());
}

#[rstest]
#[case(
    r#"[[classifiers]]
name = "a"
storage_root = "a"
parameters = [{ name = "model" }]
configurations = [{ model = "x" }, { model = "x" }]"#
)]
#[case(
    r#"[[classifiers]]
name = "a"
storage_root = "a"
parameters = [{ name = "model" }]
configurations = [{ temperature = 1 }]"#
)]
fn invalid_configurations_are_reported(registry_dir: TempDir, #[case] content: &str) {
    let path = write(&registry_dir, content);
    assert!(matches!(
        Registry::from_toml_file(&path),
        Err(RegistryError::Config { ref name, .. }) if name == "a"
    ));
}

#[rstest]
fn duplicate_names_are_rejected(registry_dir: TempDir) {
    let path = write(
        &registry_dir,
        concat!(
            "[[classifiers]]\nname = \"a\"\nstorage_root = \"a\"\n\n",
            "[[classifiers]]\nname = \"a\"\nstorage_root = \"b\"\n",
        ),
    );
    assert!(matches!(
        Registry::from_toml_file(&path),
        Err(RegistryError::Duplicate(_))
    ));
}

#[rstest]
fn malformed_and_missing_files_fail(registry_dir: TempDir) {
    let path = write(&registry_dir, "[[classifiers]]\nname = 3\n");
    assert!(matches!(
        Registry::from_toml_file(&path),
        Err(RegistryError::Parse(_))
    ));
    assert!(matches!(
        Registry::from_toml_file(registry_dir.path().join("absent.toml")),
        Err(RegistryError::Missing(_))
    ));
}

//! Explicit registration of classifiers.
//!
//! Every classifier is named once, together with its description, the
//! directory its runs and cache live under, an optional HTTP endpoint and
//! its configuration set. A registry can be built in code or loaded from a
//! TOML file:
//!
//! ```toml
//! [[classifiers]]
//! name = "keyword_prompt"
//! description = "Prompted chat model"
//! storage_root = "classifiers/keyword_prompt"
//! endpoint = "http://localhost:8080/classify"
//! parameters = [{ name = "model", description = "Chat model" }]
//! configurations = [{ model = "small" }, { model = "large" }]
//! ```
//!
//! Relative storage roots resolve against the directory of the file.

use crate::cache::{CacheError, CallCache};
use crate::config::{Config, ConfigError, ConfigSet, Parameters};
use crate::run::RunStore;
use figment::{
    Figment,
    providers::{Format, Toml},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Subdirectory of a storage root holding persisted runs.
pub const RUNS_DIR: &str = "runs";
/// File under a storage root holding the call cache.
pub const CACHE_FILE: &str = "cache.redb";
/// File under a storage root holding the evaluation table of all runs.
pub const EVALUATION_FILE: &str = "stats.csv";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("classifier `{0}` is already registered")]
    Duplicate(String),
    #[error("no classifier named `{name}`; known: {known:?}")]
    Unknown { name: String, known: Vec<String> },
    #[error("registry file {0} does not exist")]
    Missing(PathBuf),
    #[error("invalid registry file: {0}")]
    Parse(#[from] Box<figment::Error>),
    #[error("invalid configurations for classifier `{name}`: {source}")]
    Config {
        name: String,
        #[source]
        source: ConfigError,
    },
}

/// Registration of one classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierEntry {
    pub name: String,
    pub description: String,
    pub storage_root: PathBuf,
    /// Endpoint of the HTTP classification service, if any.
    pub endpoint: Option<String>,
    pub configurations: ConfigSet,
}

impl ClassifierEntry {
    /// Entry with a single default configuration and no endpoint.
    pub fn new(name: impl Into<String>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            storage_root: storage_root.into(),
            endpoint: None,
            configurations: ConfigSet::single_default(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_configurations(mut self, configurations: ConfigSet) -> Self {
        self.configurations = configurations;
        self
    }

    #[must_use]
    pub fn runs_directory(&self) -> PathBuf {
        self.storage_root.join(RUNS_DIR)
    }

    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.storage_root.join(CACHE_FILE)
    }

    #[must_use]
    pub fn evaluation_path(&self) -> PathBuf {
        self.storage_root.join(EVALUATION_FILE)
    }

    #[must_use]
    pub fn run_store(&self) -> RunStore {
        RunStore::new(self.runs_directory())
    }

    /// Open the classifier's call cache, namespaced by its name.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the storage root or database cannot be
    /// created.
    pub fn open_cache(&self) -> Result<CallCache, CacheError> {
        std::fs::create_dir_all(&self.storage_root).map_err(|source| CacheError::Io {
            path: self.storage_root.clone(),
            source,
        })?;
        CallCache::open(self.cache_path(), &self.name)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    name: String,
    #[serde(default)]
    description: String,
    storage_root: PathBuf,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    parameters: Option<Parameters>,
    #[serde(default)]
    configurations: Vec<Config>,
}

#[derive(Deserialize)]
struct RawRegistry {
    #[serde(default)]
    classifiers: Vec<RawEntry>,
}

/// Classifier name to registration, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<ClassifierEntry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a classifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is taken.
    pub fn register(&mut self, entry: ClassifierEntry) -> Result<(), RegistryError> {
        if self.entries.iter().any(|e| e.name == entry.name) {
            return Err(RegistryError::Duplicate(entry.name));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Look a classifier up by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] listing the registered names.
    pub fn get(&self, name: &str) -> Result<&ClassifierEntry, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| RegistryError::Unknown {
                name: name.to_owned(),
                known: self.names().map(str::to_owned).collect(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassifierEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a registry from a TOML file.
    ///
    /// An entry without `parameters` and `configurations` gets the single
    /// default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the file is missing or malformed, a
    /// configuration set is invalid, or a name repeats.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RegistryError::Missing(path.to_path_buf()));
        }
        let raw: RawRegistry = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let mut registry = Self::new();
        for entry in raw.classifiers {
            registry.register(resolve(entry, base)?)?;
        }
        Ok(registry)
    }
}

fn resolve(raw: RawEntry, base: &Path) -> Result<ClassifierEntry, RegistryError> {
    let configurations = match raw.parameters {
        None if raw.configurations.is_empty() => ConfigSet::single_default(),
        parameters => ConfigSet::new(parameters.unwrap_or_default(), raw.configurations)
            .map_err(|source| RegistryError::Config {
                name: raw.name.clone(),
                source,
            })?,
    };
    Ok(ClassifierEntry {
        storage_root: base.join(raw.storage_root),
        name: raw.name,
        description: raw.description,
        endpoint: raw.endpoint,
        configurations,
    })
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a ClassifierEntry;
    type IntoIter = std::slice::Iter<'a, ClassifierEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

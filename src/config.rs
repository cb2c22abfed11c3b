//! Configuration identity for classifiers.
//!
//! A [`Parameters`] declaration fixes the shape of every [`Config`] in a
//! [`ConfigSet`]. Configs are immutable key/value maps whose
//! [`Config::identifier`] is a short digest of their canonical JSON form. The
//! identifier keys both persisted runs and cached classifier calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Number of hex characters kept from the config digest.
pub const IDENTIFIER_LEN: usize = 7;

/// Errors raised while validating or selecting configurations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config does not define exactly the declared parameters.
    #[error("{config} is not valid: expected keys {expected:?}, found keys {actual:?}")]
    Invalid {
        config: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    /// Two members of a config set are equal.
    #[error("{config} is not unique in the config set")]
    Duplicate { config: String },
    /// A parameter name was declared twice.
    #[error("parameter `{name}` is declared more than once")]
    DuplicateParameter { name: String },
    /// A 1-based index outside the config set was requested.
    #[error("configuration {index} does not exist (the set has {len})")]
    NotFound { index: usize, len: usize },
    /// No member of the config set has the requested identifier.
    #[error("no configuration has identifier `{identifier}`")]
    UnknownIdentifier { identifier: String },
}

/// A named configuration slot and its human description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The ordered set of parameters every config of a classifier must define.
///
/// # Examples
///
/// ```
/// use sdg_benchmark::config::{Config, Parameters};
///
/// let params = Parameters::new([("model", "Model to query")]).unwrap();
/// assert!(params.validate(&Config::new([("model", "gpt-4o")])).is_ok());
/// assert!(params.validate(&Config::default()).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Parameters(Vec<Parameter>);

impl Parameters {
    /// Declare parameters in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateParameter`] if a name repeats.
    pub fn new<I, N, D>(slots: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        Self::from_slots(
            slots
                .into_iter()
                .map(|(name, description)| Parameter {
                    name: name.into(),
                    description: description.into(),
                })
                .collect(),
        )
    }

    fn from_slots(slots: Vec<Parameter>) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        for slot in &slots {
            if !seen.insert(slot.name.as_str()) {
                return Err(ConfigError::DuplicateParameter {
                    name: slot.name.clone(),
                });
            }
        }
        Ok(Self(slots))
    }

    /// Parameters with no slots, matched only by the empty config.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Description of a parameter, if declared.
    #[must_use]
    pub fn describe(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.description.as_str())
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|slot| slot.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that `config` defines every parameter and nothing else.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the config and both key sets
    /// when they differ.
    pub fn validate(&self, config: &Config) -> Result<(), ConfigError> {
        let expected: BTreeSet<&str> = self.names().collect();
        let actual: BTreeSet<&str> = config.keys().collect();
        if expected == actual {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                config: config.to_string(),
                expected: expected.into_iter().map(str::to_owned).collect(),
                actual: actual.into_iter().map(str::to_owned).collect(),
            })
        }
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let slots = Vec::<Parameter>::deserialize(deserializer)?;
        Self::from_slots(slots).map_err(serde::de::Error::custom)
    }
}

/// An immutable mapping from parameter name to value.
///
/// Equal contents always give equal identifiers, whatever order the pairs
/// were supplied in.
///
/// # Examples
///
/// ```
/// use sdg_benchmark::config::Config;
///
/// let a = Config::new([("model", "gpt-4o"), ("temperature", "0")]);
/// let b = Config::new([("temperature", "0"), ("model", "gpt-4o")]);
/// assert_eq!(a, b);
/// assert_eq!(a.identifier(), b.identifier());
/// assert_eq!(a.identifier().len(), 7);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(BTreeMap<String, Value>);

impl Config {
    #[must_use]
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        pairs.into_iter().collect()
    }

    /// Read a parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Read a parameter value as a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON serialization with object keys sorted at every depth.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        let mut out = String::new();
        write_canonical(&mut out, &Value::Object(self.0.clone().into_iter().collect()));
        out
    }

    /// Short stable digest of the config contents.
    ///
    /// The first [`IDENTIFIER_LEN`] hex characters of the SHA-256 digest of
    /// [`Config::canonical_json`].
    #[must_use]
    pub fn identifier(&self) -> String {
        let digest = Sha256::digest(self.canonical_json().as_bytes());
        let mut hex = format!("{digest:x}");
        hex.truncate(IDENTIFIER_LEN);
        hex
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Config {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_json())
    }
}

/// Write `value` as compact JSON with object keys in sorted order.
pub(crate) fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(out, item);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// An ordered, duplicate-free collection of configs sharing one
/// [`Parameters`] declaration.
///
/// Human-facing selection is 1-based ([`ConfigSet::get`]); [`ConfigSet::at`]
/// is the 0-based accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfigSet", into = "RawConfigSet")]
pub struct ConfigSet {
    parameters: Parameters,
    configs: Vec<Config>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfigSet {
    #[serde(default)]
    parameters: Parameters,
    #[serde(default)]
    configurations: Vec<Config>,
}

impl TryFrom<RawConfigSet> for ConfigSet {
    type Error = ConfigError;

    fn try_from(raw: RawConfigSet) -> Result<Self, Self::Error> {
        Self::new(raw.parameters, raw.configurations)
    }
}

impl From<ConfigSet> for RawConfigSet {
    fn from(set: ConfigSet) -> Self {
        Self {
            parameters: set.parameters,
            configurations: set.configs,
        }
    }
}

impl ConfigSet {
    /// Build a config set, validating every member.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first config that does not
    /// match `parameters`, or [`ConfigError::Duplicate`] naming the first
    /// repeated config.
    pub fn new(
        parameters: Parameters,
        configs: impl IntoIterator<Item = Config>,
    ) -> Result<Self, ConfigError> {
        let configs: Vec<Config> = configs.into_iter().collect();
        for config in &configs {
            parameters.validate(config)?;
        }
        for (i, config) in configs.iter().enumerate() {
            if configs.iter().skip(i + 1).any(|other| other == config) {
                return Err(ConfigError::Duplicate {
                    config: config.to_string(),
                });
            }
        }
        Ok(Self {
            parameters,
            configs,
        })
    }

    /// The set used by classifiers without tunable parameters.
    #[must_use]
    pub fn single_default() -> Self {
        Self {
            parameters: Parameters::empty(),
            configs: vec![Config::default()],
        }
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Select a config by its 1-based position.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when `index` is 0 or past the end.
    pub fn get(&self, index: usize) -> Result<&Config, ConfigError> {
        index
            .checked_sub(1)
            .and_then(|i| self.configs.get(i))
            .ok_or(ConfigError::NotFound {
                index,
                len: self.configs.len(),
            })
    }

    /// Select a config by its 0-based position.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Config> {
        self.configs.get(index)
    }

    /// Select a config by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownIdentifier`] if no member matches.
    pub fn find(&self, identifier: &str) -> Result<&Config, ConfigError> {
        self.configs
            .iter()
            .find(|config| config.identifier() == identifier)
            .ok_or_else(|| ConfigError::UnknownIdentifier {
                identifier: identifier.to_owned(),
            })
    }

    /// Identifiers of all members, in order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        self.configs.iter().map(Config::identifier).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Config> {
        self.configs.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl<'a> IntoIterator for &'a ConfigSet {
    type Item = &'a Config;
    type IntoIter = std::slice::Iter<'a, Config>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

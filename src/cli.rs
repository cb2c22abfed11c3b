//! CLI argument types and layered configuration for the `sdgbench` binary.
//! Loads from CLI args, environment (prefix `SDGBENCH_`), and optional config
//! files.

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use ortho_config::OrthoError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// What the binary should do with the selected classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Print the evaluation table across all configurations.
    #[default]
    Report,
    /// Print the stats of one configuration's run.
    Show,
    /// Remove runs of configurations no longer declared.
    Prune,
    /// Run the benchmark against the classifier's endpoint and save it.
    Evaluate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Report => "report",
            Self::Show => "show",
            Self::Prune => "prune",
            Self::Evaluate => "evaluate",
        })
    }
}

/// Invalid argument value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("unknown action `{0}`; expected report, show, prune or evaluate")]
    Action(String),
    #[error("invalid SDG filter `{0}`; expected comma-separated numbers 1 to 17")]
    Sdgs(String),
    #[error("missing required argument `{0}`")]
    Missing(&'static str),
}

impl FromStr for Action {
    type Err = ArgsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "show" => Ok(Self::Show),
            "prune" => Ok(Self::Prune),
            "evaluate" => Ok(Self::Evaluate),
            _ => Err(ArgsError::Action(s.to_owned())),
        }
    }
}

/// Command-line arguments for the `sdgbench` binary.
///
/// Configuration values are loaded from command line arguments, environment
/// variables (prefixed with `SDGBENCH_`), and an optional configuration file.
///
/// # Examples
///
/// Parse flags directly:
/// ```
/// use sdg_benchmark::cli::{Action, SdgbenchArgs};
/// use ortho_config::OrthoConfig;
///
/// let args = SdgbenchArgs::load_from_iter([
///     "sdgbench", "--classifier", "keywords", "--action", "show",
/// ])
/// .expect("load args from CLI iterator");
/// assert_eq!(args.classifier.as_deref(), Some("keywords"));
/// assert_eq!(args.action().expect("valid action"), Action::Show);
/// ```
///
/// Load from a configuration file:
/// ```
/// use sdg_benchmark::cli::SdgbenchArgs;
/// use ortho_config::OrthoConfig;
/// use std::io::Write;
/// use tempfile::NamedTempFile;
///
/// let mut file = NamedTempFile::new().expect("create temp file");
/// writeln!(file, "verbose = true").expect("write config");
/// let path = file.path().to_str().expect("path str");
/// let args = SdgbenchArgs::load_from_iter(["sdgbench", "--config-path", path])
///     .expect("load args from config path");
/// assert!(args.verbose);
/// ```
#[derive(Debug, Deserialize, ortho_config::OrthoConfig)]
#[ortho_config(prefix = "SDGBENCH")]
pub struct SdgbenchArgs {
    /// Path to the classifier registry (TOML).
    pub registry: Option<PathBuf>,

    /// Name of the classifier to act on.
    pub classifier: Option<String>,

    /// 1-based index of the configuration for `show` and `evaluate`.
    pub configuration: Option<usize>,

    /// `report`, `show`, `prune` or `evaluate`. Defaults to `report`.
    pub action: Option<String>,

    /// Benchmark dataset (CSV) for `evaluate`.
    pub dataset: Option<PathBuf>,

    /// Bearer token for the classifier endpoint.
    pub api_key: Option<String>,

    /// Comma-separated SDGs to restrict `evaluate` to, e.g. `10,13`.
    pub sdgs: Option<String>,

    /// Log progress at info level.
    #[ortho_config(default = false)]
    #[serde(default)]
    pub verbose: bool,

    /// Optional path to a configuration file.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl SdgbenchArgs {
    /// Load configuration solely from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if any variable cannot be parsed.
    pub fn load_from_env() -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Env::prefixed("SDGBENCH_"))
            .extract()
            .map_err(Into::into)
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if the file cannot be read or parsed.
    pub fn load_from_config(path: &str) -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(Into::into)
    }

    /// Load configuration from environment variables and a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if either source contains invalid values.
    pub fn load_from_env_and_config(path: &str) -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SDGBENCH_"))
            .extract()
            .map_err(Into::into)
    }

    /// The requested action.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::Action`] for an unknown action name.
    pub fn action(&self) -> Result<Action, ArgsError> {
        self.action.as_deref().map_or(Ok(Action::default()), str::parse)
    }

    /// The SDG filter, `None` when every SDG is included.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::Sdgs`] if an item is not a number from 1 to 17.
    pub fn sdg_filter(&self) -> Result<Option<BTreeSet<u8>>, ArgsError> {
        self.sdgs.as_deref().map(parse_sdg_list).transpose()
    }
}

/// Parse a comma-separated SDG list such as `10, 13`.
///
/// # Errors
///
/// Returns [`ArgsError::Sdgs`] for an empty list or an invalid item.
pub fn parse_sdg_list(raw: &str) -> Result<BTreeSet<u8>, ArgsError> {
    let invalid = || ArgsError::Sdgs(raw.to_owned());
    let set = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u8>()
                .ok()
                .filter(|sdg| (1..=crate::stats::SDG_COUNT).contains(sdg))
                .ok_or_else(invalid)
        })
        .collect::<Result<BTreeSet<u8>, _>>()?;
    if set.is_empty() {
        return Err(invalid());
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("report", Action::Report)]
    #[case("Show", Action::Show)]
    #[case(" prune ", Action::Prune)]
    #[case("EVALUATE", Action::Evaluate)]
    fn parses_actions(#[case] raw: &str, #[case] expected: Action) {
        assert_eq!(raw.parse::<Action>(), Ok(expected));
    }

    #[rstest]
    fn rejects_unknown_action() {
        assert_eq!(
            "delete".parse::<Action>(),
            Err(ArgsError::Action("delete".into()))
        );
    }

    #[rstest]
    #[case("10", &[10])]
    #[case("13, 10,13", &[10, 13])]
    fn parses_sdg_lists(#[case] raw: &str, #[case] expected: &[u8]) {
        let parsed = parse_sdg_list(raw).unwrap_or_else(|e| panic!("parse: {e}"));
        assert_eq!(parsed, expected.iter().copied().collect());
    }

    #[rstest]
    #[case("")]
    #[case("0")]
    #[case("18")]
    #[case("ten")]
    fn rejects_bad_sdg_lists(#[case] raw: &str) {
        assert!(parse_sdg_list(raw).is_err());
    }
}

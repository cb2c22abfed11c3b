//! Persisted benchmark runs, one directory per config identifier.
//!
//! A run directory holds three artefacts:
//!
//! - `meta.json`: the config and the long-form date of the run
//! - `stats.csv`: the flat stats table (aggregate row first)
//! - `results.csv`: the raw results table
//!
//! Saving writes into a hidden staging directory and renames it into place,
//! so a directory named after an identifier is either complete or absent.

use crate::benchmark::{BenchmarkOutcome, BenchmarkRecord};
use crate::config::{Config, ConfigSet};
use crate::stats::{RunStats, StatsTableError};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const META_FILE: &str = "meta.json";
pub const STATS_FILE: &str = "stats.csv";
pub const RESULTS_FILE: &str = "results.csv";

const STAGING_PREFIX: char = '.';
const STAGING_SUFFIX: &str = ".staging";
const PREVIOUS_SUFFIX: &str = ".previous";

/// Errors raised by the run store.
#[derive(Debug, Error)]
pub enum RunStoreError {
    /// A run directory exists but cannot be read back as a run.
    #[error("run {identifier} at {path} is corrupt: {reason}")]
    Load {
        identifier: String,
        path: PathBuf,
        reason: String,
    },
    /// A filesystem operation failed.
    #[error("run store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An artefact could not be serialized.
    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Format a date the long way, e.g. `October 19, 2026`.
#[must_use]
pub fn long_date(date: NaiveDate) -> String {
    format!("{} {}, {}", date.format("%B"), date.day(), date.year())
}

/// One completed benchmark execution for one config.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub config: Config,
    pub date: String,
    pub stats: RunStats,
    pub results: Vec<BenchmarkRecord>,
}

impl Run {
    /// Wrap a benchmark outcome, dated today.
    #[must_use]
    pub fn new(config: Config, outcome: BenchmarkOutcome) -> Self {
        Self::dated(config, long_date(Local::now().date_naive()), outcome)
    }

    #[must_use]
    pub fn dated(config: Config, date: impl Into<String>, outcome: BenchmarkOutcome) -> Self {
        Self {
            config,
            date: date.into(),
            stats: outcome.stats,
            results: outcome.results,
        }
    }

    /// Storage key of the run.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.config.identifier()
    }
}

#[derive(Serialize, Deserialize)]
struct Meta {
    config: Config,
    date: String,
}

/// Directory of persisted runs for one classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a config's run lives in.
    #[must_use]
    pub fn run_dir(&self, config: &Config) -> PathBuf {
        self.root.join(config.identifier())
    }

    /// Persist a run, replacing any earlier run of the same config.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] if a directory or artefact cannot be
    /// written. The previous run, if any, is kept when writing the new one
    /// fails, and is moved back when the final rename fails.
    pub fn save(&self, run: &Run) -> Result<PathBuf, RunStoreError> {
        let identifier = run.identifier();
        let target = self.root.join(&identifier);
        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{identifier}{STAGING_SUFFIX}"));

        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(io_error(&staging))?;
        }
        fs::create_dir(&staging).map_err(io_error(&staging))?;

        write_artefacts(&staging, run)?;

        let previous = self
            .root
            .join(format!("{STAGING_PREFIX}{identifier}{PREVIOUS_SUFFIX}"));
        if previous.exists() {
            fs::remove_dir_all(&previous).map_err(io_error(&previous))?;
        }
        let replacing = target.exists();
        if replacing {
            fs::rename(&target, &previous).map_err(io_error(&target))?;
        }
        if let Err(source) = fs::rename(&staging, &target) {
            if replacing {
                if let Err(e) = fs::rename(&previous, &target) {
                    warn!(path = %previous.display(), error = %e, "could not restore previous run");
                }
            }
            return Err(RunStoreError::Io {
                path: target,
                source,
            });
        }
        if replacing {
            fs::remove_dir_all(&previous).map_err(io_error(&previous))?;
        }
        info!(%identifier, path = %target.display(), "run saved");
        Ok(target)
    }

    /// Load the run of `config`.
    ///
    /// Returns `Ok(None)` when the config has never been run.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError::Load`] when the run directory exists but an
    /// artefact is missing or invalid, or was written for a different config.
    pub fn load(&self, config: &Config) -> Result<Option<Run>, RunStoreError> {
        let identifier = config.identifier();
        let dir = self.root.join(&identifier);
        if !dir.is_dir() {
            return Ok(None);
        }
        let corrupt = |reason: String| RunStoreError::Load {
            identifier: identifier.clone(),
            path: dir.clone(),
            reason,
        };

        let meta: Meta = serde_json::from_reader(BufReader::new(
            open(&dir, META_FILE).map_err(&corrupt)?,
        ))
        .map_err(|e| corrupt(format!("{META_FILE}: {e}")))?;
        if meta.config != *config {
            return Err(corrupt(format!(
                "{META_FILE} records config {} instead of {config}",
                meta.config
            )));
        }

        let stats = RunStats::read_csv(open(&dir, STATS_FILE).map_err(&corrupt)?)
            .map_err(|e: StatsTableError| corrupt(format!("{STATS_FILE}: {e}")))?;
        let results = BenchmarkRecord::read_csv(open(&dir, RESULTS_FILE).map_err(&corrupt)?)
            .map_err(|e| corrupt(format!("{RESULTS_FILE}: {e}")))?;

        Ok(Some(Run {
            config: meta.config,
            date: meta.date,
            stats,
            results,
        }))
    }

    /// Load the runs of every member of `configs`, in set order.
    ///
    /// # Errors
    ///
    /// Fails on the first corrupt run; see [`RunStore::load`].
    pub fn load_all(&self, configs: &ConfigSet) -> Result<Vec<Option<Run>>, RunStoreError> {
        configs.iter().map(|config| self.load(config)).collect()
    }

    /// Identifiers of the persisted runs, sorted. Staging directories are
    /// not runs.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError::Io`] if the directory cannot be listed.
    pub fn list(&self) -> Result<Vec<String>, RunStoreError> {
        let mut ids: Vec<String> = self
            .entries()?
            .into_iter()
            .filter(|name| !name.starts_with(STAGING_PREFIX))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Remove every run directory whose identifier is not a member of
    /// `configs`, along with leftover staging directories.
    ///
    /// Returns the removed directory names, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError::Io`] if listing or removal fails.
    pub fn prune(&self, configs: &ConfigSet) -> Result<Vec<String>, RunStoreError> {
        let keep = configs.identifiers();
        let mut removed = Vec::new();
        for name in self.entries()? {
            if keep.contains(&name) {
                continue;
            }
            let path = self.root.join(&name);
            fs::remove_dir_all(&path).map_err(io_error(&path))?;
            warn!(identifier = %name, "removed stale run");
            removed.push(name);
        }
        removed.sort();
        Ok(removed)
    }

    /// Names of the directories directly under the root.
    fn entries(&self) -> Result<Vec<String>, RunStoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error(&self.root))? {
            let entry = entry.map_err(io_error(&self.root))?;
            let is_dir = entry
                .file_type()
                .map_err(io_error(&entry.path()))?
                .is_dir();
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

fn write_artefacts(dir: &Path, run: &Run) -> Result<(), RunStoreError> {
    let meta_path = dir.join(META_FILE);
    let mut meta_out = BufWriter::new(File::create(&meta_path).map_err(io_error(&meta_path))?);
    let meta = Meta {
        config: run.config.clone(),
        date: run.date.clone(),
    };
    serde_json::to_writer_pretty(&mut meta_out, &meta).map_err(|e| RunStoreError::Write {
        path: meta_path.clone(),
        reason: e.to_string(),
    })?;
    meta_out.flush().map_err(io_error(&meta_path))?;

    let stats_path = dir.join(STATS_FILE);
    let stats_out = File::create(&stats_path).map_err(io_error(&stats_path))?;
    run.stats
        .write_csv(BufWriter::new(stats_out))
        .map_err(|e| RunStoreError::Write {
            path: stats_path.clone(),
            reason: e.to_string(),
        })?;

    let results_path = dir.join(RESULTS_FILE);
    let results_out = File::create(&results_path).map_err(io_error(&results_path))?;
    BenchmarkRecord::write_csv(&run.results, BufWriter::new(results_out)).map_err(|e| {
        RunStoreError::Write {
            path: results_path.clone(),
            reason: e.to_string(),
        }
    })
}

fn open(dir: &Path, name: &str) -> Result<File, String> {
    File::open(dir.join(name)).map_err(|e| format!("{name}: {e}"))
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> RunStoreError + '_ {
    move |source| RunStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

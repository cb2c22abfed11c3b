//! Comparisons across persisted runs.
//!
//! [`EvaluationTable`] lines up the accuracy of every configuration of one
//! classifier per label; [`RunDiff`] reports the metric deltas between two
//! runs.

use crate::config::ConfigSet;
use crate::run::{RunStore, RunStoreError};
use crate::stats::{Label, RunStats, SDG_COUNT, Stats};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// One configuration's line in an [`EvaluationTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRow {
    /// 1-based position of the configuration in its set.
    pub position: usize,
    pub identifier: String,
    /// Accuracy per table column, `None` where the run has no such label or
    /// the configuration has not been run.
    pub accuracies: Vec<Option<f64>>,
}

impl EvaluationRow {
    /// Aggregate accuracy, if the configuration has been run.
    #[must_use]
    pub fn overall(&self, labels: &[Label]) -> Option<f64> {
        labels
            .iter()
            .position(|label| *label == Label::All)
            .and_then(|i| self.accuracies[i])
    }
}

/// Accuracy of each configuration per label.
///
/// Columns follow the order `All`, `SDG 1` .. `SDG 17`; a column with no
/// value in any row is dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationTable {
    labels: Vec<Label>,
    rows: Vec<EvaluationRow>,
}

impl EvaluationTable {
    /// Build a table from `(identifier, stats)` pairs in configuration order.
    pub fn new<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<&'a RunStats>)>,
    {
        let all_labels: Vec<Label> = std::iter::once(Label::All)
            .chain((1..=SDG_COUNT).map(Label::Sdg))
            .collect();
        let full: Vec<(String, Vec<Option<f64>>)> = entries
            .into_iter()
            .map(|(identifier, stats)| {
                let accuracies = all_labels
                    .iter()
                    .map(|label| stats.and_then(|s| s.get(*label)).map(|s| s.accuracy))
                    .collect();
                (identifier, accuracies)
            })
            .collect();

        let keep: Vec<usize> = (0..all_labels.len())
            .filter(|&col| full.iter().any(|(_, acc)| acc[col].is_some()))
            .collect();
        let labels = keep.iter().map(|&col| all_labels[col]).collect();
        let rows = full
            .into_iter()
            .enumerate()
            .map(|(i, (identifier, acc))| EvaluationRow {
                position: i + 1,
                identifier,
                accuracies: keep.iter().map(|&col| acc[col]).collect(),
            })
            .collect();
        Self { labels, rows }
    }

    /// Load the run of every member of `configs` from `store` and tabulate.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] if a persisted run is corrupt.
    pub fn from_store(configs: &ConfigSet, store: &RunStore) -> Result<Self, RunStoreError> {
        let runs = store.load_all(configs)?;
        Ok(Self::new(configs.iter().zip(&runs).map(|(config, run)| {
            (config.identifier(), run.as_ref().map(|r| &r.stats))
        })))
    }

    /// Labels of the kept columns.
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[must_use]
    pub fn rows(&self) -> &[EvaluationRow] {
        &self.rows
    }

    /// Row with the highest aggregate accuracy; the earliest wins a tie.
    #[must_use]
    pub fn best(&self) -> Option<&EvaluationRow> {
        self.rows
            .iter()
            .filter_map(|row| row.overall(&self.labels).map(|acc| (acc, row)))
            .fold(None, |best: Option<(f64, &EvaluationRow)>, (acc, row)| match best {
                Some((top, _)) if top >= acc => best,
                _ => Some((acc, row)),
            })
            .map(|(_, row)| row)
    }

    /// Write the table as CSV: `Configuration`, then one column per label.
    ///
    /// # Errors
    ///
    /// Returns [`csv::Error`] if writing fails.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(
            std::iter::once("Configuration".to_owned())
                .chain(self.labels.iter().map(|l| l.heading())),
        )?;
        for row in &self.rows {
            out.write_record(
                std::iter::once(row.position.to_string()).chain(
                    row.accuracies
                        .iter()
                        .map(|acc| acc.map(|a| a.to_string()).unwrap_or_default()),
                ),
            )?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write the CSV table to `path`, creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError::Io`] if the file cannot be created and
    /// [`RunStoreError::Write`] if writing it fails.
    pub fn save(&self, path: &Path) -> Result<(), RunStoreError> {
        let io_error = |source| RunStoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = File::create(path).map_err(io_error)?;
        self.write_csv(BufWriter::new(file))
            .map_err(|e| RunStoreError::Write {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        info!(path = %path.display(), "evaluation table written");
        Ok(())
    }
}

/// Renders as a Markdown pipe table.
impl fmt::Display for EvaluationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "| Configuration | Identifier |")?;
        for label in &self.labels {
            write!(f, " {} |", label.heading())?;
        }
        writeln!(f)?;
        write!(f, "|--------------:|:-----------|")?;
        for _ in &self.labels {
            write!(f, "------:|")?;
        }
        for row in &self.rows {
            writeln!(f)?;
            write!(f, "| {} | {} |", row.position, row.identifier)?;
            for acc in &row.accuracies {
                match acc {
                    Some(value) => write!(f, " {value:.2} |")?,
                    None => write!(f, "  |")?,
                }
            }
        }
        Ok(())
    }
}

/// Change of every metric of one label between two runs.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDelta {
    pub label: Label,
    pub before: Option<Stats>,
    pub after: Option<Stats>,
}

impl MetricDelta {
    /// `after - before` per metric as
    /// `(accuracy, precision, recall, f1)`, when both sides exist.
    #[must_use]
    #[expect(clippy::float_arithmetic, reason = "metric deltas")]
    pub fn deltas(&self) -> Option<(f64, f64, f64, f64)> {
        let (before, after) = (self.before.as_ref()?, self.after.as_ref()?);
        Some((
            after.accuracy - before.accuracy,
            after.precision - before.precision,
            after.recall - before.recall,
            after.f1 - before.f1,
        ))
    }
}

/// Per-label comparison of two runs over the union of their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDiff {
    entries: Vec<MetricDelta>,
}

impl RunDiff {
    #[must_use]
    pub fn new(before: &RunStats, after: &RunStats) -> Self {
        let labels: BTreeSet<Label> = before
            .labels()
            .into_iter()
            .chain(after.labels())
            .collect();
        let entries = labels
            .into_iter()
            .map(|label| MetricDelta {
                label,
                before: before.get(label).cloned(),
                after: after.get(label).cloned(),
            })
            .collect();
        Self { entries }
    }

    /// Entries in label order, aggregate first.
    #[must_use]
    pub fn entries(&self) -> &[MetricDelta] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, label: Label) -> Option<&MetricDelta> {
        self.entries.iter().find(|entry| entry.label == label)
    }
}

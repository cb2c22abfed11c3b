//! Drive a classifier through the benchmark dataset.
//!
//! Every selected dataset row is classified exactly once, in dataset order.
//! A row counts as predicted positive when the row's SDG is among the SDGs
//! the classifier returned. Statistics are computed only after every row has
//! a prediction; the first classifier error aborts the run and no partial
//! results are produced.

use crate::dataset::{Dataset, DatasetRow, flexible_bool};
use crate::stats::{Observation, RunStats, SDG_COUNT, StatsError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info};

/// Assigns SDG numbers to a text.
///
/// Implementations usually wrap an external model call routed through a
/// [`crate::cache::CallCache`]. Outputs must be ordered SDG numbers; the
/// benchmark only checks membership.
pub trait Classifier {
    /// Error returned when classification fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Classify `text` and return the relevant SDGs.
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier cannot produce a prediction.
    fn classify(&self, text: &str) -> Result<Vec<u8>, Self::Error>;
}

impl<C: Classifier + ?Sized> Classifier for &C {
    type Error = C::Error;

    fn classify(&self, text: &str) -> Result<Vec<u8>, Self::Error> {
        (**self).classify(text)
    }
}

/// Adapter turning a closure into a [`Classifier`].
///
/// # Examples
///
/// ```
/// use sdg_benchmark::benchmark::{Classifier, FnClassifier};
///
/// let always_ten = FnClassifier::new(|_: &str| Ok::<_, std::io::Error>(vec![10]));
/// assert_eq!(always_ten.classify("anything").unwrap(), vec![10]);
/// ```
#[derive(Debug, Clone)]
pub struct FnClassifier<F>(F);

impl<F> FnClassifier<F> {
    pub fn new(function: F) -> Self {
        Self(function)
    }
}

impl<F, E> Classifier for FnClassifier<F>
where
    F: Fn(&str) -> Result<Vec<u8>, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn classify(&self, text: &str) -> Result<Vec<u8>, Self::Error> {
        (self.0)(text)
    }
}

static NUMBERS: LazyLock<Regex> = LazyLock::new(|| {
    #[expect(clippy::expect_used, reason = "constant pattern cannot fail")]
    Regex::new(r"\d+").expect("valid regex")
});

/// Extract SDG numbers from a free-text model reply.
///
/// Numbers outside `1..=17` are ignored and repeats are dropped; the order
/// of first appearance is kept.
///
/// # Examples
///
/// ```
/// use sdg_benchmark::benchmark::parse_sdgs;
///
/// assert_eq!(parse_sdgs("SDG 10, SDG 5 and again 10; 2030 agenda"), vec![10, 5]);
/// ```
#[must_use]
pub fn parse_sdgs(text: &str) -> Vec<u8> {
    let mut seen = BTreeSet::new();
    NUMBERS
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<u8>().ok())
        .filter(|sdg| (1..=SDG_COUNT).contains(sdg) && seen.insert(*sdg))
        .collect()
}

/// Outcome of classifying one dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub text: String,
    /// The SDG this row tests.
    pub sdg: u8,
    #[serde(deserialize_with = "flexible_bool")]
    pub expected_label: bool,
    /// Raw multi-label prediction, stored as a bracketed list (`[10, 3]`).
    #[serde(with = "sdg_list")]
    pub predicted_sdgs: Vec<u8>,
    /// Whether `sdg` is among `predicted_sdgs`.
    #[serde(deserialize_with = "flexible_bool")]
    pub predicted_label: bool,
    /// Whether the prediction matches the expectation.
    #[serde(deserialize_with = "flexible_bool")]
    pub correct: bool,
}

impl BenchmarkRecord {
    #[must_use]
    pub fn new(row: &DatasetRow, predicted_sdgs: Vec<u8>) -> Self {
        let predicted_label = predicted_sdgs.contains(&row.sdg);
        Self {
            text: row.text.clone(),
            sdg: row.sdg,
            expected_label: row.label,
            predicted_label,
            correct: row.label == predicted_label,
            predicted_sdgs,
        }
    }

    /// Write records as a CSV results table.
    ///
    /// # Errors
    ///
    /// Returns [`csv::Error`] if writing fails.
    pub fn write_csv<W: std::io::Write>(records: &[Self], writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        for record in records {
            out.serialize(record)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Read a results table written by [`BenchmarkRecord::write_csv`].
    ///
    /// # Errors
    ///
    /// Returns [`csv::Error`] if the table is malformed.
    pub fn read_csv<R: std::io::Read>(reader: R) -> Result<Vec<Self>, csv::Error> {
        csv::Reader::from_reader(reader).deserialize().collect()
    }
}

impl Observation for BenchmarkRecord {
    fn sdg(&self) -> u8 {
        self.sdg
    }

    fn expected(&self) -> bool {
        self.expected_label
    }

    fn predicted(&self) -> bool {
        self.predicted_label
    }
}

mod sdg_list {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(sdgs: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let items: Vec<String> = sdgs.iter().map(u8::to_string).collect();
        serializer.serialize_str(&format!("[{}]", items.join(", ")))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        serde_json::from_str(&raw)
            .map_err(|e| D::Error::custom(format!("invalid SDG list `{raw}`: {e}")))
    }
}

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
pub enum BenchmarkError<E> {
    /// The classifier failed on a row. Rows are numbered from 1 within the
    /// selected rows.
    #[error("classifier failed on row {row} (SDG {sdg}): {source}")]
    Classifier {
        row: usize,
        sdg: u8,
        #[source]
        source: E,
    },
    /// The results could not be turned into statistics.
    #[error(transparent)]
    Stats(#[from] StatsError),
}

impl<E> BenchmarkError<E> {
    /// The classifier's own error, if that is what aborted the run.
    pub fn into_classifier_error(self) -> Option<E> {
        match self {
            Self::Classifier { source, .. } => Some(source),
            Self::Stats(_) => None,
        }
    }
}

/// Results or stats were requested before the benchmark completed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("benchmark is not complete")]
pub struct IncompleteRunError;

/// Raw results and statistics of a completed benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkOutcome {
    pub results: Vec<BenchmarkRecord>,
    pub stats: RunStats,
}

/// Classify every selected row of `dataset` and compute statistics.
///
/// `sdgs` restricts the run to rows testing those SDGs.
///
/// # Errors
///
/// Returns [`BenchmarkError::Classifier`] on the first failed prediction and
/// [`BenchmarkError::Stats`] when no rows were selected.
pub fn run<C: Classifier + ?Sized>(
    classifier: &C,
    dataset: &Dataset,
    sdgs: Option<&BTreeSet<u8>>,
) -> Result<BenchmarkOutcome, BenchmarkError<C::Error>> {
    let rows: Vec<&DatasetRow> = dataset.filtered(sdgs).collect();
    let total = rows.len();
    info!(rows = total, filtered = sdgs.is_some(), "running benchmark");

    let mut results = Vec::with_capacity(total);
    for (i, row) in rows.into_iter().enumerate() {
        let predicted = classifier
            .classify(&row.text)
            .map_err(|source| BenchmarkError::Classifier {
                row: i + 1,
                sdg: row.sdg,
                source,
            })?;
        debug!(row = i + 1, total, sdg = row.sdg, ?predicted, "row classified");
        results.push(BenchmarkRecord::new(row, predicted));
    }

    let stats = RunStats::calculate(&results)?;
    info!(
        rows = total,
        accuracy = stats.overall().accuracy,
        f1 = stats.overall().f1,
        "benchmark completed"
    );
    Ok(BenchmarkOutcome { results, stats })
}

/// A benchmark over one dataset, holding its outcome once run.
#[derive(Debug, Clone)]
pub struct Benchmark {
    dataset: Dataset,
    sdgs: Option<BTreeSet<u8>>,
    outcome: Option<BenchmarkOutcome>,
}

impl Benchmark {
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            sdgs: None,
            outcome: None,
        }
    }

    /// Only score rows testing these SDGs.
    #[must_use]
    pub fn with_sdgs(mut self, sdgs: impl IntoIterator<Item = u8>) -> Self {
        self.sdgs = Some(sdgs.into_iter().collect());
        self
    }

    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Classify the dataset and keep the outcome. A failed run clears any
    /// earlier outcome.
    ///
    /// # Errors
    ///
    /// See [`run`].
    pub fn run<C: Classifier + ?Sized>(
        &mut self,
        classifier: &C,
    ) -> Result<&BenchmarkOutcome, BenchmarkError<C::Error>> {
        self.outcome = None;
        let outcome = run(classifier, &self.dataset, self.sdgs.as_ref())?;
        Ok(&*self.outcome.insert(outcome))
    }

    /// Results of the completed run.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteRunError`] before a successful [`Benchmark::run`].
    pub fn results(&self) -> Result<&[BenchmarkRecord], IncompleteRunError> {
        self.outcome
            .as_ref()
            .map(|o| o.results.as_slice())
            .ok_or(IncompleteRunError)
    }

    /// Statistics of the completed run.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteRunError`] before a successful [`Benchmark::run`].
    pub fn stats(&self) -> Result<&RunStats, IncompleteRunError> {
        self.outcome
            .as_ref()
            .map(|o| &o.stats)
            .ok_or(IncompleteRunError)
    }

    /// Take the outcome out of the benchmark.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteRunError`] before a successful [`Benchmark::run`].
    pub fn into_outcome(self) -> Result<BenchmarkOutcome, IncompleteRunError> {
        self.outcome.ok_or(IncompleteRunError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetError;
    use rstest::rstest;
    use std::cell::Cell;

    fn row(text: &str, sdg: u8, label: bool) -> DatasetRow {
        DatasetRow {
            text: text.into(),
            sdg,
            label,
        }
    }

    #[rstest]
    #[case(vec![10, 3], true, true, true)]
    #[case(vec![3], true, false, false)]
    #[case(vec![], false, false, true)]
    #[case(vec![10], false, true, false)]
    fn record_derives_labels(
        #[case] predicted: Vec<u8>,
        #[case] expected: bool,
        #[case] predicted_label: bool,
        #[case] correct: bool,
    ) {
        let record = BenchmarkRecord::new(&row("t", 10, expected), predicted);
        assert_eq!(record.predicted_label, predicted_label);
        assert_eq!(record.correct, correct);
    }

    #[rstest]
    #[case("1, 2, 3", vec![1, 2, 3])]
    #[case("No relevant goals.", vec![])]
    #[case("0 18 17 017", vec![17])]
    fn parses_free_text(#[case] text: &str, #[case] expected: Vec<u8>) {
        assert_eq!(parse_sdgs(text), expected);
    }

    #[rstest]
    fn classifier_error_aborts_without_outcome() -> Result<(), DatasetError> {
        let dataset = Dataset::new(vec![
            row("a", 1, true),
            row("boom", 2, true),
            row("c", 3, true),
        ])?;
        let calls = Cell::new(0);
        let classifier = FnClassifier::new(|text: &str| {
            calls.set(calls.get() + 1);
            if text == "boom" {
                Err(std::io::Error::other("upstream down"))
            } else {
                Ok(vec![1])
            }
        });
        let mut benchmark = Benchmark::new(dataset);
        let err = benchmark
            .run(&classifier)
            .err()
            .unwrap_or_else(|| panic!("run should fail"));
        assert!(matches!(err, BenchmarkError::Classifier { row: 2, sdg: 2, .. }));
        assert_eq!(calls.get(), 2);
        assert_eq!(benchmark.stats().err(), Some(IncompleteRunError));
        assert!(benchmark.results().is_err());
        Ok(())
    }

    #[rstest]
    fn empty_selection_is_a_stats_error() -> Result<(), DatasetError> {
        let dataset = Dataset::new(vec![row("a", 1, true)])?;
        let classifier = FnClassifier::new(|_: &str| Ok::<_, std::io::Error>(vec![1]));
        let mut benchmark = Benchmark::new(dataset).with_sdgs([5]);
        assert!(matches!(
            benchmark.run(&classifier),
            Err(BenchmarkError::Stats(StatsError::Empty))
        ));
        Ok(())
    }

    #[rstest]
    fn results_csv_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let records = vec![
            BenchmarkRecord::new(&row("quoted, \"text\"", 4, true), vec![4, 12]),
            BenchmarkRecord::new(&row("none", 4, false), vec![]),
        ];
        let mut buffer = Vec::new();
        BenchmarkRecord::write_csv(&records, &mut buffer)?;
        let text = String::from_utf8(buffer.clone())?;
        assert!(text.starts_with(
            "text,sdg,expected_label,predicted_sdgs,predicted_label,correct\n"
        ));
        assert!(text.contains("[4, 12]"));
        assert_eq!(BenchmarkRecord::read_csv(buffer.as_slice())?, records);
        Ok(())
    }
}

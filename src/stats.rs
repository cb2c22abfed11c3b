//! Classification-quality statistics over boolean expected/predicted labels.
//!
//! For the aggregate and for every SDG present in a results table a 2x2
//! confusion matrix is built and turned into a [`Stats`] record. Percentages
//! (accuracy, precision, recall) and the F1 score (0-1 scale) are rounded to
//! two decimals; every ratio with a zero denominator is defined as 0.
//!
//! [`RunStats`] flattens to one row per present [`Stats`] (aggregate first)
//! and rebuilds from those rows without loss, which is how persisted runs are
//! reloaded without re-scoring.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of Sustainable Development Goals.
pub const SDG_COUNT: u8 = 17;

/// Column headings for display, in flat-table column order.
pub const HUMAN_LABELS: [(&str, &str); 10] = [
    ("label", "SDG"),
    ("n", "n"),
    ("accuracy", "Accuracy (%)"),
    ("precision", "Precision (%)"),
    ("recall", "Recall (%)"),
    ("f1", "F1 Score"),
    ("tp", "TP"),
    ("fp", "FP"),
    ("tn", "TN"),
    ("fn", "FN"),
];

/// Errors raised when building or rebuilding statistics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// No rows were available to compute the aggregate.
    #[error("cannot compute statistics from an empty results table")]
    Empty,
    /// A label outside `1..=17` was encountered.
    #[error("label `{0}` is not an SDG between 1 and {SDG_COUNT}")]
    InvalidLabel(String),
    /// The flat table has no aggregate row.
    #[error("stats table has no aggregate `All` row")]
    MissingAggregate,
    /// The flat table lists a label twice.
    #[error("stats table lists label `{0}` more than once")]
    DuplicateLabel(Label),
    /// A row claims zero samples.
    #[error("stats row for label `{0}` has no samples")]
    NoSamples(Label),
    /// A row's sample count or metrics disagree with its confusion counts.
    #[error("stats row for label `{0}` does not match its confusion counts")]
    Inconsistent(Label),
}

/// What a [`Stats`] record describes: every row, or one SDG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Label {
    All,
    Sdg(u8),
}

impl Label {
    /// Label for an SDG number.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidLabel`] outside `1..=17`.
    pub fn sdg(sdg: u8) -> Result<Self, StatsError> {
        if (1..=SDG_COUNT).contains(&sdg) {
            Ok(Self::Sdg(sdg))
        } else {
            Err(StatsError::InvalidLabel(sdg.to_string()))
        }
    }

    /// Column heading used in comparison tables: `All` or `SDG n`.
    #[must_use]
    pub fn heading(self) -> String {
        match self {
            Self::All => "All".to_owned(),
            Self::Sdg(n) => format!("SDG {n}"),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Sdg(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Label {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "All" {
            return Ok(Self::All);
        }
        trimmed
            .parse::<u8>()
            .map_err(|_| StatsError::InvalidLabel(trimmed.to_owned()))
            .and_then(Self::sdg)
    }
}

impl TryFrom<String> for Label {
    type Error = StatsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}

/// Counts of a 2x2 confusion matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    pub fn_: u64,
}

impl ConfusionMatrix {
    /// Record one `(expected, predicted)` observation.
    pub fn record(&mut self, expected: bool, predicted: bool) {
        match (expected, predicted) {
            (true, true) => self.tp += 1,
            (false, true) => self.fp += 1,
            (false, false) => self.tn += 1,
            (true, false) => self.fn_ += 1,
        }
    }

    #[must_use]
    pub fn n(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }

    /// Fraction of correct observations, 0 when empty.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.n())
    }

    /// `tp / (tp + fp)`, 0 when nothing was predicted positive.
    #[must_use]
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// `tp / (tp + fn)`, 0 when nothing was expected positive.
    #[must_use]
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Harmonic mean of precision and recall, 0 when both are 0.
    #[must_use]
    #[expect(clippy::float_arithmetic, reason = "harmonic mean")]
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

impl FromIterator<(bool, bool)> for ConfusionMatrix {
    fn from_iter<T: IntoIterator<Item = (bool, bool)>>(iter: T) -> Self {
        let mut matrix = Self::default();
        for (expected, predicted) in iter {
            matrix.record(expected, predicted);
        }
        matrix
    }
}

#[expect(clippy::float_arithmetic, reason = "ratio of counts")]
#[expect(clippy::cast_precision_loss, reason = "sample counts fit in f64 mantissa")]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Round half away from zero to two decimals.
#[expect(clippy::float_arithmetic, reason = "decimal rounding")]
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[expect(clippy::float_arithmetic, reason = "fraction to percentage")]
fn percent(fraction: f64) -> f64 {
    round2(fraction * 100.0)
}

/// Quality metrics for one label (or the aggregate).
///
/// Field order is the flat-table column order:
/// `label, n, accuracy, precision, recall, f1, tp, fp, tn, fn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub label: Label,
    pub n: u64,
    /// Percentage, two decimals.
    pub accuracy: f64,
    /// Percentage, two decimals.
    pub precision: f64,
    /// Percentage, two decimals.
    pub recall: f64,
    /// 0-1 scale, two decimals.
    pub f1: f64,
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
}

impl Stats {
    /// Derive stats from a confusion matrix.
    ///
    /// Returns `None` for an empty matrix: a label without samples has no
    /// stats, which is not the same as a label scoring 0%.
    ///
    /// # Examples
    ///
    /// ```
    /// use sdg_benchmark::stats::{ConfusionMatrix, Label, Stats};
    ///
    /// let matrix: ConfusionMatrix = [(true, true), (true, false), (false, false), (false, true)]
    ///     .into_iter()
    ///     .collect();
    /// let stats = Stats::from_matrix(Label::Sdg(10), &matrix).unwrap();
    /// assert_eq!(
    ///     (stats.accuracy, stats.precision, stats.recall, stats.f1),
    ///     (50.0, 50.0, 50.0, 0.5)
    /// );
    /// ```
    #[must_use]
    pub fn from_matrix(label: Label, matrix: &ConfusionMatrix) -> Option<Self> {
        let n = matrix.n();
        (n > 0).then(|| Self {
            label,
            n,
            accuracy: percent(matrix.accuracy()),
            precision: percent(matrix.precision()),
            recall: percent(matrix.recall()),
            f1: round2(matrix.f1()),
            tp: matrix.tp,
            fp: matrix.fp,
            tn: matrix.tn,
            fn_: matrix.fn_,
        })
    }

    /// Confusion counts the record was derived from.
    #[must_use]
    pub fn matrix(&self) -> ConfusionMatrix {
        ConfusionMatrix {
            tp: self.tp,
            fp: self.fp,
            tn: self.tn,
            fn_: self.fn_,
        }
    }

    /// Derive stats from `(expected, predicted)` pairs.
    #[must_use]
    pub fn from_pairs(label: Label, pairs: impl IntoIterator<Item = (bool, bool)>) -> Option<Self> {
        Self::from_matrix(label, &pairs.into_iter().collect())
    }
}

/// Labelled observation consumed by [`RunStats::calculate`].
pub trait Observation {
    /// SDG the observation tests.
    fn sdg(&self) -> u8;
    fn expected(&self) -> bool;
    fn predicted(&self) -> bool;
}

/// Aggregate stats plus one optional slot per SDG.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    overall: Stats,
    sdgs: [Option<Stats>; SDG_COUNT as usize],
}

impl RunStats {
    /// Compute the aggregate and per-SDG stats of a complete results table.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Empty`] when there are no observations and
    /// [`StatsError::InvalidLabel`] for an observation outside `1..=17`.
    pub fn calculate<'a, O, I>(observations: I) -> Result<Self, StatsError>
    where
        O: Observation + 'a,
        I: IntoIterator<Item = &'a O>,
    {
        let mut overall = ConfusionMatrix::default();
        let mut per_sdg = [ConfusionMatrix::default(); SDG_COUNT as usize];
        for obs in observations {
            let slot = slot_index(obs.sdg())?;
            overall.record(obs.expected(), obs.predicted());
            per_sdg[slot].record(obs.expected(), obs.predicted());
        }
        let overall = Stats::from_matrix(Label::All, &overall).ok_or(StatsError::Empty)?;
        let sdgs = std::array::from_fn(|i| {
            let sdg = u8::try_from(i + 1).unwrap_or(SDG_COUNT);
            Stats::from_matrix(Label::Sdg(sdg), &per_sdg[i])
        });
        Ok(Self { overall, sdgs })
    }

    #[must_use]
    pub fn overall(&self) -> &Stats {
        &self.overall
    }

    /// Stats of one SDG, `None` when it had no rows (or is out of range).
    #[must_use]
    pub fn sdg(&self, sdg: u8) -> Option<&Stats> {
        slot_index(sdg).ok().and_then(|i| self.sdgs[i].as_ref())
    }

    /// Stats of any label.
    #[must_use]
    pub fn get(&self, label: Label) -> Option<&Stats> {
        match label {
            Label::All => Some(&self.overall),
            Label::Sdg(n) => self.sdg(n),
        }
    }

    /// Per-SDG slots, index 0 holding SDG 1.
    #[must_use]
    pub fn sdg_slots(&self) -> &[Option<Stats>] {
        &self.sdgs
    }

    /// Present stats, aggregate first then SDGs ascending.
    pub fn iter(&self) -> impl Iterator<Item = &Stats> {
        std::iter::once(&self.overall).chain(self.sdgs.iter().flatten())
    }

    /// Labels with stats, aggregate first.
    #[must_use]
    pub fn labels(&self) -> Vec<Label> {
        self.iter().map(|stats| stats.label).collect()
    }

    /// Flatten to one row per present label.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Stats> {
        self.iter().cloned().collect()
    }

    /// Rebuild from the rows produced by [`RunStats::to_rows`].
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::MissingAggregate`] without an `All` row,
    /// [`StatsError::DuplicateLabel`] if a label repeats,
    /// [`StatsError::NoSamples`] for a row with `n == 0` and
    /// [`StatsError::Inconsistent`] for a row whose `n` or metrics are not
    /// the ones its counts produce.
    pub fn from_rows(rows: impl IntoIterator<Item = Stats>) -> Result<Self, StatsError> {
        let mut overall = None;
        let mut sdgs: [Option<Stats>; SDG_COUNT as usize] = Default::default();
        for row in rows {
            if row.n == 0 {
                return Err(StatsError::NoSamples(row.label));
            }
            if Stats::from_matrix(row.label, &row.matrix()).as_ref() != Some(&row) {
                return Err(StatsError::Inconsistent(row.label));
            }
            let slot = match row.label {
                Label::All => &mut overall,
                Label::Sdg(n) => &mut sdgs[slot_index(n)?],
            };
            if slot.is_some() {
                return Err(StatsError::DuplicateLabel(row.label));
            }
            *slot = Some(row);
        }
        let overall = overall.ok_or(StatsError::MissingAggregate)?;
        Ok(Self { overall, sdgs })
    }

    /// Write the flat table as CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`csv::Error`] if writing fails.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        for row in self.iter() {
            out.serialize(row)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Read a flat table written by [`RunStats::write_csv`].
    ///
    /// # Errors
    ///
    /// Returns [`StatsTableError`] if the CSV is malformed or the rows do
    /// not form valid stats.
    pub fn read_csv<R: std::io::Read>(reader: R) -> Result<Self, StatsTableError> {
        let rows = csv::Reader::from_reader(reader)
            .deserialize()
            .collect::<Result<Vec<Stats>, _>>()?;
        Ok(Self::from_rows(rows)?)
    }
}

/// Renders as a Markdown pipe table with human-readable headings.
impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|")?;
        for (_, heading) in HUMAN_LABELS {
            write!(f, " {heading} |")?;
        }
        writeln!(f)?;
        write!(f, "|")?;
        for _ in HUMAN_LABELS {
            write!(f, "---:|")?;
        }
        for s in self.iter() {
            writeln!(f)?;
            write!(
                f,
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {} | {} | {} | {} |",
                s.label, s.n, s.accuracy, s.precision, s.recall, s.f1, s.tp, s.fp, s.tn, s.fn_
            )?;
        }
        Ok(())
    }
}

/// Failure to read a persisted stats table.
#[derive(Debug, Error)]
pub enum StatsTableError {
    #[error("malformed stats table: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Stats(#[from] StatsError),
}

fn slot_index(sdg: u8) -> Result<usize, StatsError> {
    Label::sdg(sdg).map(|_| usize::from(sdg) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct Row(u8, bool, bool);

    impl Observation for Row {
        fn sdg(&self) -> u8 {
            self.0
        }
        fn expected(&self) -> bool {
            self.1
        }
        fn predicted(&self) -> bool {
            self.2
        }
    }

    #[rstest]
    #[case(ConfusionMatrix { tp: 0, fp: 0, tn: 3, fn_: 0 }, 100.0, 0.0, 0.0, 0.0)]
    #[case(ConfusionMatrix { tp: 0, fp: 2, tn: 0, fn_: 1 }, 0.0, 0.0, 0.0, 0.0)]
    #[case(ConfusionMatrix { tp: 2, fp: 1, tn: 0, fn_: 0 }, 66.67, 66.67, 100.0, 0.8)]
    #[case(ConfusionMatrix { tp: 1, fp: 0, tn: 1, fn_: 2 }, 50.0, 100.0, 33.33, 0.5)]
    fn zero_division_and_rounding(
        #[case] matrix: ConfusionMatrix,
        #[case] accuracy: f64,
        #[case] precision: f64,
        #[case] recall: f64,
        #[case] f1: f64,
    ) {
        let stats = Stats::from_matrix(Label::All, &matrix)
            .unwrap_or_else(|| panic!("matrix has samples"));
        assert_eq!(
            (stats.accuracy, stats.precision, stats.recall, stats.f1),
            (accuracy, precision, recall, f1)
        );
    }

    #[rstest]
    fn empty_matrix_has_no_stats() {
        assert_eq!(Stats::from_matrix(Label::Sdg(3), &ConfusionMatrix::default()), None);
    }

    #[rstest]
    fn absent_labels_differ_from_zero_scores() -> Result<(), StatsError> {
        let rows = [Row(1, true, false), Row(1, true, false), Row(2, true, true)];
        let stats = RunStats::calculate(&rows)?;
        let sdg1 = stats.sdg(1).unwrap_or_else(|| panic!("SDG 1 has rows"));
        assert_eq!(sdg1.accuracy, 0.0);
        assert_eq!(sdg1.n, 2);
        assert!(stats.sdg(3).is_none());
        assert_eq!(stats.labels(), vec![Label::All, Label::Sdg(1), Label::Sdg(2)]);
        Ok(())
    }

    #[rstest]
    fn calculate_rejects_empty_and_out_of_range() {
        let none: [Row; 0] = [];
        assert_eq!(RunStats::calculate(&none), Err(StatsError::Empty));
        assert_eq!(
            RunStats::calculate(&[Row(18, true, true)]),
            Err(StatsError::InvalidLabel("18".into()))
        );
    }

    #[rstest]
    #[case("All", Ok(Label::All))]
    #[case("10", Ok(Label::Sdg(10)))]
    #[case("0", Err(StatsError::InvalidLabel("0".into())))]
    #[case("SDG 1", Err(StatsError::InvalidLabel("SDG 1".into())))]
    fn parse_labels(#[case] text: &str, #[case] expected: Result<Label, StatsError>) {
        assert_eq!(text.parse::<Label>(), expected);
    }

    #[rstest]
    fn from_rows_requires_aggregate_and_unique_labels() -> Result<(), StatsError> {
        let stats = RunStats::calculate(&[Row(4, true, true), Row(5, false, true)])?;
        let mut rows = stats.to_rows();
        assert_eq!(RunStats::from_rows(rows.clone()), Ok(stats.clone()));

        rows.push(rows[1].clone());
        assert_eq!(
            RunStats::from_rows(rows),
            Err(StatsError::DuplicateLabel(Label::Sdg(4)))
        );
        let without_all: Vec<Stats> = stats.to_rows().into_iter().skip(1).collect();
        assert_eq!(RunStats::from_rows(without_all), Err(StatsError::MissingAggregate));
        Ok(())
    }

    #[rstest]
    #[case::sample_count(|row: &mut Stats| row.n = 5)]
    #[case::accuracy(|row: &mut Stats| row.accuracy = 99.0)]
    #[case::f1(|row: &mut Stats| row.f1 = 0.1)]
    #[case::counts(|row: &mut Stats| row.tp += 1)]
    fn from_rows_rejects_rows_that_disagree_with_counts(#[case] tamper: fn(&mut Stats)) {
        let stats = RunStats::calculate(&[Row(4, true, true), Row(4, false, false)])
            .unwrap_or_else(|e| panic!("stats: {e}"));
        let mut rows = stats.to_rows();
        tamper(&mut rows[1]);
        assert_eq!(
            RunStats::from_rows(rows),
            Err(StatsError::Inconsistent(Label::Sdg(4)))
        );
    }

    #[rstest]
    fn csv_round_trip_keeps_values() -> Result<(), Box<dyn std::error::Error>> {
        let rows = [
            Row(1, true, true),
            Row(1, false, true),
            Row(1, true, false),
            Row(9, false, false),
        ];
        let stats = RunStats::calculate(&rows)?;
        let mut buffer = Vec::new();
        stats.write_csv(&mut buffer)?;
        let text = String::from_utf8(buffer.clone())?;
        assert!(text.starts_with("label,n,accuracy,precision,recall,f1,tp,fp,tn,fn\nAll,4,"));
        assert_eq!(RunStats::read_csv(buffer.as_slice())?, stats);
        Ok(())
    }
}

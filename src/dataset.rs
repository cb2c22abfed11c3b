//! The benchmark dataset: one row per text/SDG pair to test.
//!
//! Files are CSV with the columns `text`, `sdg` and `label`, where `label`
//! states whether the text is relevant to `sdg`.

use crate::stats::SDG_COUNT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dataset: {0}")]
    Csv(#[from] csv::Error),
    /// A row names an SDG outside `1..=17`. Rows are numbered from 1.
    #[error("dataset row {row} has SDG {sdg}, expected 1 to {SDG_COUNT}")]
    SdgOutOfRange { row: usize, sdg: u8 },
}

/// One ground-truth row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub text: String,
    pub sdg: u8,
    /// Whether `text` is relevant to `sdg`.
    #[serde(deserialize_with = "flexible_bool")]
    pub label: bool,
}

/// Accept `true`/`false` in any case, as written by spreadsheet and
/// dataframe tools, plus `1`/`0`.
pub(crate) fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid boolean `{other}`"))),
    }
}

/// A validated benchmark dataset in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    rows: Vec<DatasetRow>,
}

impl Dataset {
    /// Build a dataset from rows, checking every SDG is in range.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::SdgOutOfRange`] for the first invalid row.
    pub fn new(rows: Vec<DatasetRow>) -> Result<Self, DatasetError> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| !(1..=SDG_COUNT).contains(&row.sdg))
        {
            return Err(DatasetError::SdgOutOfRange {
                row: i + 1,
                sdg: row.sdg,
            });
        }
        Ok(Self { rows })
    }

    /// Load a dataset from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the file cannot be read or is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Load a dataset from CSV text.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the CSV is malformed or a row is invalid.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let rows = csv::Reader::from_reader(reader)
            .deserialize()
            .collect::<Result<Vec<DatasetRow>, _>>()?;
        Self::new(rows)
    }

    #[must_use]
    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    /// Rows whose SDG is in `sdgs`, or every row when `sdgs` is `None`.
    pub fn filtered<'a>(
        &'a self,
        sdgs: Option<&'a BTreeSet<u8>>,
    ) -> impl Iterator<Item = &'a DatasetRow> + 'a {
        self.rows
            .iter()
            .filter(move |row| sdgs.is_none_or(|set| set.contains(&row.sdg)))
    }

    /// SDGs covered by at least one row, ascending.
    #[must_use]
    pub fn sdgs(&self) -> BTreeSet<u8> {
        self.rows.iter().map(|row| row.sdg).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

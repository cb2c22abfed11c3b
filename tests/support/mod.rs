//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use sdg_benchmark::{Dataset, DatasetRow};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};

#[expect(clippy::float_arithmetic, reason = "tolerance comparison")]
#[must_use]
pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

pub fn row(text: &str, sdg: u8, label: bool) -> DatasetRow {
    DatasetRow {
        text: text.to_owned(),
        sdg,
        label,
    }
}

pub fn dataset(rows: Vec<DatasetRow>) -> Dataset {
    Dataset::new(rows).unwrap_or_else(|e| panic!("dataset: {e}"))
}

/// Mixed dataset covering SDGs 3, 10 and 13.
pub fn sample_dataset() -> Dataset {
    dataset(vec![
        row("Reduce income inequality within countries", 10, true),
        row("Stock prices rose sharply", 10, false),
        row("Vaccination campaigns cut child mortality", 3, true),
        row("Cut greenhouse gas emissions", 13, true),
        row("The football season starts", 13, false),
    ])
}

/// Keyword classifier that counts its invocations.
#[derive(Debug, Default)]
pub struct KeywordClassifier {
    pub calls: AtomicUsize,
}

impl KeywordClassifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl sdg_benchmark::Classifier for KeywordClassifier {
    type Error = Infallible;

    fn classify(&self, text: &str) -> Result<Vec<u8>, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut sdgs = Vec::new();
        if lower.contains("mortality") || lower.contains("health") {
            sdgs.push(3);
        }
        if lower.contains("inequality") || lower.contains("stock") {
            sdgs.push(10);
        }
        if lower.contains("emissions") {
            sdgs.push(13);
        }
        Ok(sdgs)
    }
}

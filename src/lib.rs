//! Core library entry point.
//! Re-exports public types and traits.
//!
//! Benchmarks SDG (Sustainable Development Goal) text classifiers: each
//! classifier configuration is identified by a digest of its content, run
//! against a labelled dataset, scored per SDG, and persisted so reports can
//! be regenerated without classifying again.

#[cfg(feature = "provider-api")]
pub mod api;
pub mod benchmark;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod registry;
pub mod run;
pub mod stats;

#[cfg(feature = "provider-api")]
pub use api::{ApiClassifier, ApiClassifierError};
pub use benchmark::{
    Benchmark, BenchmarkError, BenchmarkOutcome, BenchmarkRecord, Classifier, FnClassifier,
    IncompleteRunError, parse_sdgs,
};
pub use cache::{CacheError, CachedCallError, CallCache, Memoized};
#[cfg(feature = "cli")]
pub use cli::SdgbenchArgs;
pub use compare::{EvaluationTable, RunDiff};
pub use config::{Config, ConfigError, ConfigSet, Parameter, Parameters};
pub use dataset::{Dataset, DatasetError, DatasetRow};
pub use registry::{ClassifierEntry, Registry, RegistryError};
pub use run::{Run, RunStore, RunStoreError};
pub use stats::{ConfusionMatrix, Label, RunStats, Stats, StatsError};

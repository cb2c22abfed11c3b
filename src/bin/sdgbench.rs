use ortho_config::{OrthoConfig, OrthoError};
use sdg_benchmark::cli::{Action, ArgsError, SdgbenchArgs};
use sdg_benchmark::{
    ClassifierEntry, ConfigError, EvaluationTable, Registry, RegistryError, RunStoreError,
};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Load(#[from] std::sync::Arc<OrthoError>),
    #[error(transparent)]
    Args(#[from] ArgsError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] RunStoreError),
    #[cfg(feature = "provider-api")]
    #[error(transparent)]
    Evaluate(#[from] evaluate::EvaluateError),
    #[cfg(not(feature = "provider-api"))]
    #[error("`evaluate` needs sdgbench built with the provider-api feature")]
    EvaluateUnavailable,
}

#[expect(
    clippy::result_large_err,
    reason = "OrthoError originates from external crate and is acceptable here"
)]
fn main() -> Result<(), CliError> {
    let args = SdgbenchArgs::load()?;
    init_logging(args.verbose);

    let action = args.action()?;
    let registry_path = args.registry.as_ref().ok_or(ArgsError::Missing("registry"))?;
    let registry = Registry::from_toml_file(registry_path)?;
    let name = args
        .classifier
        .as_deref()
        .ok_or(ArgsError::Missing("classifier"))?;
    let entry = registry.get(name)?;

    match action {
        Action::Report => report(entry),
        Action::Show => show(entry, args.configuration.unwrap_or(1)),
        Action::Prune => prune(entry),
        #[cfg(feature = "provider-api")]
        Action::Evaluate => Ok(evaluate::run(entry, &args)?),
        #[cfg(not(feature = "provider-api"))]
        Action::Evaluate => Err(CliError::EvaluateUnavailable),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[expect(clippy::result_large_err, reason = "shares the binary's error type")]
fn report(entry: &ClassifierEntry) -> Result<(), CliError> {
    let table = EvaluationTable::from_store(&entry.configurations, &entry.run_store())?;
    table.save(&entry.evaluation_path())?;
    println!("{}", entry.name);
    if !entry.description.is_empty() {
        println!("{}", entry.description);
    }
    println!();
    println!("{table}");
    if let Some(best) = table.best() {
        println!();
        println!("Best: configuration {} ({})", best.position, best.identifier);
    }
    Ok(())
}

#[expect(clippy::result_large_err, reason = "shares the binary's error type")]
fn show(entry: &ClassifierEntry, index: usize) -> Result<(), CliError> {
    let config = entry.configurations.get(index)?;
    let identifier = config.identifier();
    println!("Configuration {index} ({identifier}): {config}");
    match entry.run_store().load(config)? {
        Some(run) => {
            println!("Run of {}", run.date);
            println!();
            println!("{}", run.stats);
        }
        None => println!("not yet run"),
    }
    Ok(())
}

#[expect(clippy::result_large_err, reason = "shares the binary's error type")]
fn prune(entry: &ClassifierEntry) -> Result<(), CliError> {
    let removed = entry.run_store().prune(&entry.configurations)?;
    if removed.is_empty() {
        println!("no stale runs");
    }
    for identifier in removed {
        println!("removed {identifier}");
    }
    Ok(())
}

#[cfg(feature = "provider-api")]
mod evaluate {
    use sdg_benchmark::cli::{ArgsError, SdgbenchArgs};
    use sdg_benchmark::{
        ApiClassifier, ApiClassifierError, Benchmark, BenchmarkError, CacheError,
        ClassifierEntry, ConfigError, Dataset, DatasetError, IncompleteRunError, Run,
        RunStoreError,
    };
    use thiserror::Error;
    use tracing::info;

    #[derive(Debug, Error)]
    pub enum EvaluateError {
        #[error(transparent)]
        Args(#[from] ArgsError),
        #[error("classifier `{0}` has no endpoint")]
        NoEndpoint(String),
        #[error(transparent)]
        Config(#[from] ConfigError),
        #[error(transparent)]
        Dataset(#[from] DatasetError),
        #[error(transparent)]
        Cache(#[from] CacheError),
        #[error(transparent)]
        Client(#[from] ApiClassifierError),
        #[error(transparent)]
        Benchmark(#[from] BenchmarkError<ApiClassifierError>),
        #[error(transparent)]
        Incomplete(#[from] IncompleteRunError),
        #[error(transparent)]
        Store(#[from] RunStoreError),
    }

    pub fn run(entry: &ClassifierEntry, args: &SdgbenchArgs) -> Result<(), EvaluateError> {
        let endpoint = entry
            .endpoint
            .as_deref()
            .ok_or_else(|| EvaluateError::NoEndpoint(entry.name.clone()))?;
        let index = args.configuration.unwrap_or(1);
        let config = entry.configurations.get(index)?;
        let dataset_path = args.dataset.as_ref().ok_or(ArgsError::Missing("dataset"))?;
        let dataset = Dataset::from_path(dataset_path)?;

        let classifier = ApiClassifier::new(endpoint, args.api_key.clone(), config.clone())?
            .with_cache(entry.open_cache()?);
        let mut benchmark = Benchmark::new(dataset);
        if let Some(sdgs) = args.sdg_filter()? {
            benchmark = benchmark.with_sdgs(sdgs);
        }
        benchmark.run(&classifier)?;

        let run = Run::new(config.clone(), benchmark.into_outcome()?);
        let path = entry.run_store().save(&run)?;
        info!(classifier = %entry.name, configuration = index, "evaluation saved");
        println!("saved {}", path.display());
        println!();
        println!("{}", run.stats);
        Ok(())
    }
}

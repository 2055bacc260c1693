//! # hp-cli
//!
//! Command line front end: loads component catalogs, resolves the pipeline to
//! tune, runs the chosen optimizer and reports the decoded configuration.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use hp_optimizer::{Optimizer, OptimizerConfig, OptimizerKind};
use hp_types::{ComponentCatalog, OptimizedPipeline, PipelineComponents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptimizerChoice {
    Hyperband,
    Default,
}

impl From<OptimizerChoice> for OptimizerKind {
    fn from(choice: OptimizerChoice) -> Self {
        match choice {
            OptimizerChoice::Hyperband => OptimizerKind::Hyperband,
            OptimizerChoice::Default => OptimizerKind::Default,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "hp-optimize")]
#[command(about = "Tune the hyperparameters of a preprocessing and classification pipeline")]
#[command(version)]
pub struct Cli {
    /// Classifier component name
    #[arg(long)]
    pub classifier: String,

    /// Attribute search component; requires --evaluator
    #[arg(long, requires = "evaluator")]
    pub searcher: Option<String>,

    /// Attribute evaluator component; requires --searcher
    #[arg(long, requires = "searcher")]
    pub evaluator: Option<String>,

    /// Dataset name, resolved to <dataset-dir>/<dataset>.arff
    #[arg(long)]
    pub dataset: String,

    /// Working directory of the driver and evaluator
    #[arg(long, default_value = ".")]
    pub environment: PathBuf,

    #[arg(long, default_value = "datasets")]
    pub dataset_dir: PathBuf,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Search budget in seconds handed to the driver
    #[arg(long, default_value_t = 300)]
    pub budget: u64,

    /// Hard wall-clock limit in seconds
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Component catalog files; later files override earlier ones
    #[arg(long, num_args = 1..)]
    pub components: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = OptimizerChoice::Hyperband)]
    pub optimizer: OptimizerChoice,

    /// Python interpreter running the search driver
    #[arg(long, default_value = "python")]
    pub python: String,

    /// Evaluator jar; defaults to <environment>/PipelineEvaluator.jar
    #[arg(long)]
    pub evaluator_jar: Option<PathBuf>,

    /// Write the decoded pipeline here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Parse CLI arguments from an iterator (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

impl Cli {
    pub fn config(&self) -> OptimizerConfig {
        let mut config = OptimizerConfig::new(&self.environment, &self.dataset_dir)
            .with_seed(self.seed)
            .with_search_budget(self.budget)
            .with_timeout(self.timeout)
            .with_interpreter(vec![self.python.clone(), "-u".to_string()]);
        if let Some(jar) = &self.evaluator_jar {
            config = config.with_evaluator_command(vec![
                "java".to_string(),
                "-jar".to_string(),
                jar.to_string_lossy().into_owned(),
            ]);
        }
        config
    }

    pub fn catalog_paths(&self) -> Vec<PathBuf> {
        if !self.components.is_empty() {
            return self.components.clone();
        }
        let models = self.environment.join("models");
        vec![
            models.join("weka-classifiers.json"),
            models.join("weka-preprocessors.json"),
        ]
    }
}

pub fn load_catalog(paths: &[PathBuf]) -> anyhow::Result<ComponentCatalog> {
    let mut catalog = ComponentCatalog::new();
    for path in paths {
        catalog
            .load_file(path)
            .with_context(|| format!("loading component catalog {}", path.display()))?;
    }
    info!(
        "Loaded {} components from {} catalog files",
        catalog.len(),
        paths.len()
    );
    Ok(catalog)
}

/// Look up the requested components by name.
pub fn resolve_components(cli: &Cli, catalog: &ComponentCatalog) -> anyhow::Result<PipelineComponents> {
    let classifier = catalog.get(&cli.classifier)?.clone();
    match (&cli.searcher, &cli.evaluator) {
        (Some(searcher), Some(evaluator)) => Ok(PipelineComponents::with_preprocessor(
            catalog.get(searcher)?.clone(),
            catalog.get(evaluator)?.clone(),
            classifier,
        )),
        (None, None) => Ok(PipelineComponents::classifier_only(classifier)),
        _ => bail!("--searcher and --evaluator must be given together"),
    }
}

pub fn run(cli: &Cli) -> anyhow::Result<OptimizedPipeline> {
    let catalog = load_catalog(&cli.catalog_paths())?;
    let components = resolve_components(cli, &catalog)?;

    let mut optimizer = OptimizerKind::from(cli.optimizer).build(components, cli.dataset.clone(), cli.config());
    optimizer
        .optimize()
        .with_context(|| format!("{} optimization of {} failed", optimizer.name(), cli.classifier))?;
    Ok(optimizer.result()?.clone())
}

pub fn write_output(pipeline: &OptimizedPipeline, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(pipeline)?;
    match output {
        Some(path) => {
            fs::write(path, json + "\n").with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote optimized pipeline to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

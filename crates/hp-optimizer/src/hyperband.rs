//! Hyperband optimization through an external Python driver.
//!
//! A run writes a generated wrapper (search space plus evaluator invocation)
//! and a main script into the environment, supervises the interpreter until it
//! exits or the timeout kills it, and then picks the best trial from the log
//! the driver left behind.

use tracing::{info, warn};

use hp_types::{config_error, HpResult, OptimizedPipeline, PipelineComponents};

use crate::catalog::MergedCatalog;
use crate::config::OptimizerConfig;
use crate::encoder::{InvocationTemplate, SearchSpaceEncoder};
use crate::optimizer::{finished_result, settle, Optimizer};
use crate::run::{ArtifactLayout, OptimizationRun, RunId};
use crate::selector::ResultSelector;
use crate::supervisor::{ProcessSpec, ProcessSupervisor};
use crate::trial::OptimizationStatus;

pub const RUN_SUFFIX: &str = "Hyperband";

pub struct HyperbandOptimizer {
    components: PipelineComponents,
    dataset: String,
    config: OptimizerConfig,
    status: OptimizationStatus,
    result: Option<OptimizedPipeline>,
}

impl HyperbandOptimizer {
    pub fn new(
        components: PipelineComponents,
        dataset: impl Into<String>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            components,
            dataset: dataset.into(),
            config,
            status: OptimizationStatus::new(),
            result: None,
        }
    }

    pub fn run_id(&self) -> RunId {
        RunId::new(&self.components, &self.dataset, self.config.seed).with_suffix(RUN_SUFFIX)
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Merge the catalog and write the driver artifacts.
    pub fn prepare(&self) -> HpResult<OptimizationRun> {
        self.config.validate()?;
        let environment = self.config.environment_dir()?;
        let id = self.run_id();
        let catalog = MergedCatalog::from_components(&self.components)?;
        let layout = ArtifactLayout::hyperband(&environment, &id);

        let invocation = InvocationTemplate {
            command: self.config.evaluator_command()?,
            result_file: layout.result_file.clone(),
            dataset_path: self.config.dataset_path(&self.dataset)?,
            seed: self.config.seed,
        };
        SearchSpaceEncoder::new(&self.components, &catalog, invocation)
            .write_artifacts(&layout, self.config.search_budget_secs)?;
        info!(
            "Prepared run {} with {} tunable parameters",
            id,
            catalog.len()
        );

        Ok(OptimizationRun {
            id,
            environment,
            catalog,
            layout,
            timeout: self.config.timeout(),
            search_budget_secs: self.config.search_budget_secs,
        })
    }

    fn driver_spec(&self, run: &OptimizationRun) -> HpResult<ProcessSpec> {
        let (program, args) = self
            .config
            .interpreter
            .split_first()
            .ok_or_else(|| config_error!("interpreter command must not be empty"))?;
        Ok(ProcessSpec::new(program.clone(), run.environment.clone())
            .args(args.iter().cloned())
            .arg(run.layout.main_script.to_string_lossy()))
    }

    fn execute(&mut self) -> HpResult<OptimizedPipeline> {
        let run = self.prepare()?;

        self.status.mark_running();
        let spec = self.driver_spec(&run)?;
        let outcome = ProcessSupervisor::new(self.config.poll_interval()).run(&spec, run.timeout)?;
        if outcome.killed {
            self.status.mark_killed();
            warn!(
                "Driver for {} exceeded {:?}; selecting from whatever it logged",
                run.id, run.timeout
            );
        } else if !outcome.status.success() {
            warn!("Driver for {} exited with {}", run.id, outcome.status);
        }

        let selector = ResultSelector::new(&self.components, &run.catalog);
        let (best, count) = selector.select_best(&run.layout.trial_log)?;
        self.status.record_selection(count, best.loss);
        selector.decode(&best)
    }
}

impl Optimizer for HyperbandOptimizer {
    fn name(&self) -> &str {
        "hyperband"
    }

    fn optimize(&mut self) -> HpResult<()> {
        self.status.reset();
        self.result = None;
        self.status.mark_preparing(Some(self.run_id().to_string()));
        info!(
            "Optimizing {} on {} with Hyperband",
            self.components.classifier.name, self.dataset
        );

        let outcome = self.execute();
        settle("hyperband", &mut self.status, &mut self.result, outcome)
    }

    fn status(&self) -> &OptimizationStatus {
        &self.status
    }

    fn result(&self) -> HpResult<&OptimizedPipeline> {
        finished_result(&self.status, &self.result)
    }
}

//! Optimizer lifecycle shared by every optimization strategy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

use hp_types::{
    config_error, ComponentInstance, HpError, HpResult, OptimizedPipeline, PipelineComponents,
    StageConfiguration,
};

use crate::config::OptimizerConfig;
use crate::hyperband::HyperbandOptimizer;
use crate::trial::{OptimizationStatus, OptimizerState};

/// Common trait for all optimizers.
///
/// An optimizer is bound to one pipeline, dataset and configuration at
/// construction. `optimize` drives it from `Idle` to `Succeeded` or `Failed`;
/// calling it again starts over.
pub trait Optimizer: Send {
    fn name(&self) -> &str;

    fn optimize(&mut self) -> HpResult<()>;

    fn status(&self) -> &OptimizationStatus;

    /// Decoded stage configurations of the last successful run.
    fn result(&self) -> HpResult<&OptimizedPipeline>;

    fn final_searcher(&self) -> HpResult<Option<&StageConfiguration>> {
        Ok(self.result()?.searcher.as_ref())
    }

    fn final_evaluator(&self) -> HpResult<Option<&StageConfiguration>> {
        Ok(self.result()?.evaluator.as_ref())
    }

    fn final_classifier(&self) -> HpResult<&StageConfiguration> {
        Ok(&self.result()?.classifier)
    }

    /// Hand the result to the pipeline factory.
    fn optimized_instance(&self) -> HpResult<ComponentInstance> {
        Ok(self.result()?.to_instance())
    }
}

/// Record the outcome of a run in `status` and `slot`.
pub(crate) fn settle(
    name: &str,
    status: &mut OptimizationStatus,
    slot: &mut Option<OptimizedPipeline>,
    outcome: HpResult<OptimizedPipeline>,
) -> HpResult<()> {
    match outcome {
        Ok(pipeline) => {
            *slot = Some(pipeline);
            status.mark_succeeded();
            info!("{} optimizer finished", name);
            Ok(())
        }
        Err(e) => {
            *slot = None;
            status.mark_failed(e.to_string());
            error!("{} optimizer failed: {}", name, e);
            Err(e)
        }
    }
}

pub(crate) fn finished_result<'a>(
    status: &OptimizationStatus,
    slot: &'a Option<OptimizedPipeline>,
) -> HpResult<&'a OptimizedPipeline> {
    match (status.state, slot) {
        (OptimizerState::Succeeded, Some(pipeline)) => Ok(pipeline),
        _ => Err(HpError::NotOptimized),
    }
}

/// Returns every stage with an empty parameter map, so each component runs
/// with its own built-in defaults.
#[derive(Debug, Clone)]
pub struct DefaultOptimizer {
    components: PipelineComponents,
    status: OptimizationStatus,
    result: Option<OptimizedPipeline>,
}

impl DefaultOptimizer {
    pub fn new(components: PipelineComponents) -> Self {
        Self {
            components,
            status: OptimizationStatus::new(),
            result: None,
        }
    }
}

impl Optimizer for DefaultOptimizer {
    fn name(&self) -> &str {
        "default"
    }

    fn optimize(&mut self) -> HpResult<()> {
        self.status.reset();
        self.result = None;
        let pipeline = OptimizedPipeline::defaults(&self.components);
        settle("default", &mut self.status, &mut self.result, Ok(pipeline))
    }

    fn status(&self) -> &OptimizationStatus {
        &self.status
    }

    fn result(&self) -> HpResult<&OptimizedPipeline> {
        finished_result(&self.status, &self.result)
    }
}

/// Selectable optimizer implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Hyperband,
    Default,
}

impl OptimizerKind {
    pub fn build(
        self,
        components: PipelineComponents,
        dataset: impl Into<String>,
        config: OptimizerConfig,
    ) -> Box<dyn Optimizer> {
        match self {
            Self::Hyperband => Box::new(HyperbandOptimizer::new(components, dataset, config)),
            Self::Default => Box::new(DefaultOptimizer::new(components)),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hyperband => write!(f, "hyperband"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = HpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hyperband" => Ok(Self::Hyperband),
            "default" => Ok(Self::Default),
            other => Err(config_error!("unknown optimizer: {}", other)),
        }
    }
}

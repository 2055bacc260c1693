//! # hp-optimizer
//!
//! Hyperparameter optimization of attribute-selection and classification
//! pipelines through an external search driver.
//!
//! Merges the parameter catalogs of a pipeline under collision-free keys,
//! renders the search space and evaluator invocation as driver artifacts,
//! supervises the driver process under a hard timeout, and decodes the best
//! trial back into per-stage configurations.

pub mod catalog;
pub mod config;
pub mod encoder;
pub mod hyperband;
pub mod naming;
pub mod optimizer;
pub mod run;
pub mod selector;
pub mod supervisor;
mod trial;

pub use catalog::{MergedCatalog, MergedParameter};
pub use config::OptimizerConfig;
pub use encoder::{DrawRule, InvocationTemplate, SearchSpaceEncoder, SpaceDescription, SpaceEntry};
pub use hyperband::HyperbandOptimizer;
pub use optimizer::{DefaultOptimizer, Optimizer, OptimizerKind};
pub use run::{ArtifactLayout, OptimizationRun, RunId};
pub use selector::ResultSelector;
pub use supervisor::{ProcessOutcome, ProcessSpec, ProcessSupervisor};
pub use trial::{OptimizationStatus, OptimizerState, TrialAssignment};

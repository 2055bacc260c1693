//! Run identifiers and the files generated for a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hp_types::PipelineComponents;

use crate::catalog::MergedCatalog;

/// Deterministic stem for every artifact of a (pipeline, dataset, seed) run.
///
/// Repeating a run reuses the same files; two concurrent runs of the same
/// tuple write to the same paths and are not supported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new(components: &PipelineComponents, dataset: &str, seed: u64) -> Self {
        let mut raw = match &components.preprocessor {
            Some(pre) => format!("{}_{}", pre.searcher.name, pre.evaluator.name),
            None => "null".to_string(),
        };
        raw.push('_');
        raw.push_str(&components.classifier.name);
        raw.push('_');
        raw.push_str(dataset);
        raw.push('_');
        raw.push_str(&seed.to_string());

        Self(raw.replace('.', "").replace('-', "_"))
    }

    /// Append an optimizer-specific suffix so different optimizers never share
    /// files.
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.0.push_str(suffix);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the Hyperband driver files of a run live inside the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Entry point executed by the interpreter.
    pub main_script: PathBuf,
    /// Generated module with the search space and per-trial invocation.
    pub wrapper_module: PathBuf,
    /// Import path of the wrapper module, relative to the driver directory.
    pub wrapper_import: String,
    /// JSON trial log the driver writes when it finishes.
    pub trial_log: PathBuf,
    /// Loss file the evaluator writes for each trial.
    pub result_file: PathBuf,
}

impl ArtifactLayout {
    pub fn hyperband(environment: &Path, id: &RunId) -> Self {
        let driver_dir = environment.join("optimizer").join("hyperband");
        Self {
            main_script: driver_dir.join(format!("main_{id}.py")),
            wrapper_module: driver_dir.join("generated").join(format!("wrapper_{id}.py")),
            wrapper_import: format!("generated.wrapper_{id}"),
            trial_log: environment.join("hyperband-output").join(format!("{id}.json")),
            result_file: environment.join("results").join(format!("{id}.txt")),
        }
    }

    pub fn paths(&self) -> [&Path; 4] {
        [
            &self.main_script,
            &self.wrapper_module,
            &self.trial_log,
            &self.result_file,
        ]
    }
}

/// Everything prepared for one optimization run before the driver starts.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRun {
    pub id: RunId,
    /// Absolute working directory of the driver.
    pub environment: PathBuf,
    pub catalog: MergedCatalog,
    pub layout: ArtifactLayout,
    pub timeout: Duration,
    pub search_budget_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hp_types::ComponentDescriptor;

    fn components() -> PipelineComponents {
        PipelineComponents::with_preprocessor(
            ComponentDescriptor::new("weka.attributeSelection.Ranker"),
            ComponentDescriptor::new("weka.attributeSelection.ReliefFAttributeEval"),
            ComponentDescriptor::new("weka.classifiers.lazy.KStar"),
        )
    }

    #[test]
    fn run_id_is_deterministic_and_clean() {
        let id = RunId::new(&components(), "breast-cancer", 0);
        assert_eq!(
            id.as_str(),
            "wekaattributeSelectionRanker_wekaattributeSelectionReliefFAttributeEval_wekaclassifierslazyKStar_breast_cancer_0"
        );
        assert!(!id.as_str().contains('.'));
        assert!(!id.as_str().contains('-'));
        assert_eq!(id, RunId::new(&components(), "breast-cancer", 0));
    }

    #[test]
    fn short_names_with_optimizer_suffix() {
        let components = PipelineComponents::with_preprocessor(
            ComponentDescriptor::new("Ranker"),
            ComponentDescriptor::new("ReliefF"),
            ComponentDescriptor::new("KStar"),
        );
        let id = RunId::new(&components, "breast-cancer", 0).with_suffix("Hyperband");
        assert_eq!(id.as_str(), "Ranker_ReliefF_KStar_breast_cancer_0Hyperband");
    }

    #[test]
    fn distinct_tuples_do_not_collide() {
        let a = RunId::new(&components(), "breast-cancer", 0);
        let b = RunId::new(&components(), "breast-cancer", 1);
        let c = RunId::new(
            &PipelineComponents::classifier_only(ComponentDescriptor::new(
                "weka.classifiers.lazy.KStar",
            )),
            "breast-cancer",
            0,
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(c.as_str().starts_with("null_"));
    }

    #[test]
    fn layout_is_stable_for_repeated_runs() {
        let id = RunId::new(&components(), "iris", 3).with_suffix("Hyperband");
        let env = Path::new("/opt/env");
        let first = ArtifactLayout::hyperband(env, &id);
        let second = ArtifactLayout::hyperband(env, &RunId::new(&components(), "iris", 3).with_suffix("Hyperband"));
        assert_eq!(first, second);
        assert!(first.main_script.ends_with(format!("optimizer/hyperband/main_{id}.py")));
        assert!(first.trial_log.ends_with(format!("hyperband-output/{id}.json")));
        assert_eq!(first.wrapper_import, format!("generated.wrapper_{id}"));
    }
}

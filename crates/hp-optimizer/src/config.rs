//! Optimizer configuration, passed explicitly to every optimizer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hp_types::{config_error, HpResult};

use crate::supervisor::DEFAULT_POLL_INTERVAL;

/// Settings shared by all optimizers of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Working directory holding the driver, evaluator and generated files.
    pub environment: PathBuf,

    /// Directory containing `<dataset>.arff` files.
    pub dataset_dir: PathBuf,

    pub seed: u64,

    /// Search budget in seconds handed to the external driver.
    pub search_budget_secs: u64,

    /// Hard wall-clock limit in seconds after which the driver is killed.
    pub timeout_secs: u64,

    pub poll_interval_ms: u64,

    /// Interpreter command that runs the driver's main script, which is
    /// appended as the last argument.
    pub interpreter: Vec<String>,

    /// Command prefix that starts the evaluator. Defaults to
    /// `java -jar <environment>/PipelineEvaluator.jar`.
    pub evaluator_command: Option<Vec<String>>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            environment: PathBuf::from("."),
            dataset_dir: PathBuf::from("datasets"),
            seed: 0,
            search_budget_secs: 300,
            timeout_secs: 600,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            interpreter: vec!["python".to_string(), "-u".to_string()],
            evaluator_command: None,
        }
    }
}

impl OptimizerConfig {
    pub fn new(environment: impl Into<PathBuf>, dataset_dir: impl Into<PathBuf>) -> Self {
        Self {
            environment: environment.into(),
            dataset_dir: dataset_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_search_budget(mut self, secs: u64) -> Self {
        self.search_budget_secs = secs;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_evaluator_command(mut self, command: Vec<String>) -> Self {
        self.evaluator_command = Some(command);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Absolute working directory; generated scripts embed absolute paths.
    pub fn environment_dir(&self) -> HpResult<PathBuf> {
        absolutize(&self.environment)
    }

    pub fn dataset_path(&self, dataset: &str) -> HpResult<PathBuf> {
        Ok(absolutize(&self.dataset_dir)?.join(format!("{dataset}.arff")))
    }

    pub fn evaluator_command(&self) -> HpResult<Vec<String>> {
        match &self.evaluator_command {
            Some(command) => Ok(command.clone()),
            None => {
                let jar = self.environment_dir()?.join("PipelineEvaluator.jar");
                Ok(vec![
                    "java".to_string(),
                    "-jar".to_string(),
                    jar.to_string_lossy().into_owned(),
                ])
            }
        }
    }

    pub fn validate(&self) -> HpResult<()> {
        if self.timeout_secs == 0 {
            return Err(config_error!("timeout must be at least one second"));
        }
        if self.poll_interval_ms == 0 {
            return Err(config_error!("poll interval must be positive"));
        }
        if self.interpreter.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(config_error!("interpreter command must not be empty"));
        }
        if matches!(&self.evaluator_command, Some(command) if command.is_empty()) {
            return Err(config_error!("evaluator command must not be empty"));
        }
        Ok(())
    }
}

fn absolutize(path: &Path) -> HpResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

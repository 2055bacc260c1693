//! Trial assignments and optimization run status tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One parameter assignment evaluated by the search driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialAssignment {
    /// Lower is better.
    pub loss: f64,
    /// Unique key -> textual value.
    pub params: HashMap<String, String>,
}

impl TrialAssignment {
    pub fn new(loss: f64) -> Self {
        Self {
            loss,
            params: HashMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Lifecycle state of an optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerState {
    Idle,
    /// Merging catalogs and writing artifacts.
    Preparing,
    /// Supervising the external driver.
    Running,
    Succeeded,
    Failed,
}

impl Default for OptimizerState {
    fn default() -> Self {
        Self::Idle
    }
}

impl OptimizerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Aggregate status of the most recent `optimize` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub state: OptimizerState,
    pub run_id: Option<String>,
    pub trials_evaluated: usize,
    pub best_loss: Option<f64>,
    /// Whether the driver had to be killed by the watchdog.
    pub killed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OptimizationStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return to `Idle`, dropping everything recorded by a previous call.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn mark_preparing(&mut self, run_id: Option<String>) {
        self.state = OptimizerState::Preparing;
        self.started_at = Some(Utc::now());
        self.run_id = run_id;
    }

    pub fn mark_running(&mut self) {
        self.state = OptimizerState::Running;
    }

    pub fn mark_killed(&mut self) {
        self.killed = true;
    }

    pub fn record_selection(&mut self, trials_evaluated: usize, best_loss: f64) {
        self.trials_evaluated = trials_evaluated;
        self.best_loss = Some(best_loss);
    }

    pub fn mark_succeeded(&mut self) {
        self.state = OptimizerState::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = OptimizerState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

//! Trial log parsing, best-trial selection and decoding into stage
//! configurations.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use hp_types::{
    config_error, json_scalar_text, HpResult, OptimizedPipeline, ParameterDomain,
    PipelineComponents, SelectionError,
};

use crate::catalog::MergedCatalog;
use crate::encoder::truncate_integer;
use crate::naming;
use crate::trial::TrialAssignment;

/// Tokens Python's `json` module writes for non-finite floats.
const NON_FINITE: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

#[derive(Debug, Deserialize)]
struct TrialRecord {
    #[serde(deserialize_with = "loss_value")]
    loss: f64,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
}

impl From<TrialRecord> for TrialAssignment {
    fn from(record: TrialRecord) -> Self {
        let params: HashMap<String, String> = record
            .params
            .iter()
            .map(|(key, value)| (key.clone(), json_scalar_text(value)))
            .collect();
        Self {
            loss: record.loss,
            params,
        }
    }
}

/// A loss is a number, a quoted non-finite token or `null` (NaN).
fn loss_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom(format!("loss {n} out of range"))),
        serde_json::Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid loss {text:?}"))),
        serde_json::Value::Null => Ok(f64::NAN),
        other => Err(D::Error::custom(format!("invalid loss {other}"))),
    }
}

/// Quote bare `NaN`/`Infinity`/`-Infinity` outside string literals so the
/// text becomes valid JSON.
fn quote_non_finite(text: &str) -> Cow<'_, str> {
    if !NON_FINITE.iter().any(|token| text.contains(token)) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = NON_FINITE.iter().find(|t| rest.starts_with(*t)) {
            out.push('"');
            out.push_str(token);
            out.push('"');
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

/// Parse a trial log: a JSON array of `{"loss": .., "params": {..}}` records.
///
/// Non-finite losses as written by Python are accepted; NaN trials are
/// never selected and infinite ones rank last.
pub fn parse_trials(text: &str) -> HpResult<Vec<TrialAssignment>> {
    let records: Vec<TrialRecord> = serde_json::from_str(&quote_non_finite(text))?;
    Ok(records.into_iter().map(TrialAssignment::from).collect())
}

/// Read a trial log from disk. A missing file counts as an empty log.
pub fn read_trials(path: &Path) -> HpResult<Vec<TrialAssignment>> {
    match fs::read_to_string(path) {
        Ok(text) => parse_trials(&text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No trial log at {}", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Position of the trial with the lowest loss; the earliest one wins ties.
/// Trials whose loss is NaN are never selected.
pub fn best_index(trials: &[TrialAssignment]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, trial) in trials.iter().enumerate() {
        if trial.loss.is_nan() {
            continue;
        }
        match best {
            Some(current) if trials[current].loss <= trial.loss => {}
            _ => best = Some(index),
        }
    }
    best
}

pub fn best_trial(trials: &[TrialAssignment]) -> Option<&TrialAssignment> {
    best_index(trials).map(|index| &trials[index])
}

/// Value as the pipeline factory expects it for `domain`.
///
/// The driver only speaks floating point, so integer parameters may arrive
/// as `"7.0"`; they are truncated toward zero.
pub fn correct_value(domain: &ParameterDomain, key: &str, raw: &str) -> Result<String, SelectionError> {
    match domain {
        ParameterDomain::Numeric { integer: true, .. } => truncate_integer(raw)
            .map(|v| v.to_string())
            .ok_or_else(|| SelectionError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        _ => Ok(raw.to_string()),
    }
}

/// Selects the winning trial of a run and decodes it per stage.
#[derive(Debug, Clone, Copy)]
pub struct ResultSelector<'a> {
    components: &'a PipelineComponents,
    catalog: &'a MergedCatalog,
}

impl<'a> ResultSelector<'a> {
    pub fn new(components: &'a PipelineComponents, catalog: &'a MergedCatalog) -> Self {
        Self {
            components,
            catalog,
        }
    }

    /// Best trial from the log at `path`, together with the number of trials
    /// it was chosen from.
    pub fn select_best(&self, path: &Path) -> HpResult<(TrialAssignment, usize)> {
        let mut trials = read_trials(path)?;
        let count = trials.len();
        let index = best_index(&trials).ok_or_else(|| SelectionError::NoTrials {
            path: path.to_path_buf(),
        })?;
        let best = trials.swap_remove(index);
        info!(
            "Selected trial {} of {} with loss {}",
            index + 1,
            count,
            best.loss
        );
        Ok((best, count))
    }

    /// Split a trial assignment into per-stage parameter maps.
    pub fn decode(&self, trial: &TrialAssignment) -> HpResult<OptimizedPipeline> {
        let mut pipeline = OptimizedPipeline::defaults(self.components);

        for parameter in &self.catalog.parameters {
            let name = naming::decode(&parameter.key)?;
            let role = naming::role_of(&parameter.key)?;
            let raw = trial
                .value(&parameter.key)
                .ok_or_else(|| SelectionError::MissingValue {
                    key: parameter.key.clone(),
                })?;
            let value = correct_value(&parameter.descriptor.domain, &parameter.key, raw)?;

            let stage = pipeline.stage_mut(role).ok_or_else(|| {
                config_error!("{} belongs to an absent {} stage", parameter.key, role)
            })?;
            stage.parameters.insert(name.to_string(), value);
        }

        Ok(pipeline)
    }
}

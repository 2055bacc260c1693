//! Search space description and evaluator invocation rendering.
//!
//! The external driver is a Python Hyperband implementation. For every run two
//! modules are generated: a wrapper exposing `get_params()` (one draw rule per
//! merged parameter) and `try_params(n_iterations, params)` (one evaluator
//! call per trial), and a main script that starts the driver.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use hp_types::{HpError, HpResult, ParameterDomain, PipelineComponents, SelectionError};

use crate::catalog::MergedCatalog;
use crate::run::ArtifactLayout;
use crate::trial::TrialAssignment;

/// How the driver samples one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawRule {
    /// Integer in `[low, high]` inclusive.
    IntUniform { low: i64, high: i64 },
    /// Real in `[low, high]`.
    RealUniform { low: f64, high: f64 },
    /// One of the literal values.
    Choice { values: Vec<String> },
}

impl DrawRule {
    pub fn for_domain(domain: &ParameterDomain) -> Self {
        match domain {
            ParameterDomain::Numeric {
                min,
                max,
                integer: true,
            } => DrawRule::IntUniform {
                low: min.trunc() as i64,
                high: max.trunc() as i64,
            },
            ParameterDomain::Numeric {
                min,
                max,
                integer: false,
            } => DrawRule::RealUniform {
                low: *min,
                high: *max,
            },
            ParameterDomain::Boolean => DrawRule::Choice {
                values: vec!["true".to_string(), "false".to_string()],
            },
            ParameterDomain::Categorical { values } => DrawRule::Choice {
                values: values.clone(),
            },
        }
    }

    /// Python expression drawing a value under this rule.
    pub fn to_python(&self) -> String {
        match self {
            DrawRule::IntUniform { low, high } => {
                format!("np.random.choice(range({}, {}, 1))", low, high.saturating_add(1))
            }
            DrawRule::RealUniform { low, high } => {
                format!("np.random.uniform({:?}, {:?})", low, high)
            }
            DrawRule::Choice { values } => {
                let literals: Vec<String> = values.iter().map(|v| py_str(v)).collect();
                format!("np.random.choice([{}])", literals.join(", "))
            }
        }
    }
}

/// A draw rule bound to a role-tagged key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceEntry {
    pub key: String,
    pub rule: DrawRule,
}

/// The merged search space as the driver sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceDescription {
    pub entries: Vec<SpaceEntry>,
}

impl SpaceDescription {
    pub fn from_catalog(catalog: &MergedCatalog) -> Self {
        let entries = catalog
            .parameters
            .iter()
            .map(|p| SpaceEntry {
                key: p.key.clone(),
                rule: DrawRule::for_domain(&p.descriptor.domain),
            })
            .collect();
        Self { entries }
    }

    pub fn rule(&self, key: &str) -> Option<&DrawRule> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.rule)
    }

    /// The `get_params()` function of the wrapper module.
    pub fn to_python(&self) -> String {
        let mut out = String::from("def get_params():\n    params = {\n");
        for entry in &self.entries {
            let _ = writeln!(out, "        {}: {},", py_str(&entry.key), entry.rule.to_python());
        }
        out.push_str("    }\n    return handle_integers(params)\n");
        out
    }
}

/// Fixed part of every evaluator call of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationTemplate {
    /// Program and leading arguments, e.g. `java -jar PipelineEvaluator.jar`.
    pub command: Vec<String>,
    pub result_file: PathBuf,
    pub dataset_path: PathBuf,
    pub seed: u64,
}

/// Renders the merged catalog into driver artifacts and evaluator arguments.
#[derive(Debug, Clone)]
pub struct SearchSpaceEncoder<'a> {
    components: &'a PipelineComponents,
    catalog: &'a MergedCatalog,
    invocation: InvocationTemplate,
}

impl<'a> SearchSpaceEncoder<'a> {
    pub fn new(
        components: &'a PipelineComponents,
        catalog: &'a MergedCatalog,
        invocation: InvocationTemplate,
    ) -> Self {
        Self {
            components,
            catalog,
            invocation,
        }
    }

    pub fn invocation(&self) -> &InvocationTemplate {
        &self.invocation
    }

    pub fn space_description(&self) -> SpaceDescription {
        SpaceDescription::from_catalog(self.catalog)
    }

    /// Evaluator arguments for one trial, without the command prefix.
    ///
    /// Without an assignment every parameter that declares a default is passed
    /// with it and the others are left out.
    pub fn render_arguments(&self, assignment: Option<&TrialAssignment>) -> HpResult<Vec<String>> {
        let mut args = vec![
            self.invocation.result_file.to_string_lossy().into_owned(),
            self.invocation.dataset_path.to_string_lossy().into_owned(),
            self.invocation.seed.to_string(),
        ];

        for (role, component) in self.components.stages() {
            args.push(component.name.clone());
            for parameter in self.catalog.for_role(role) {
                let value = match assignment {
                    Some(trial) => {
                        let raw = trial.value(&parameter.key).ok_or_else(|| {
                            SelectionError::MissingValue {
                                key: parameter.key.clone(),
                            }
                        })?;
                        format_value(&parameter.descriptor.domain, &parameter.key, raw)?
                    }
                    None => match &parameter.descriptor.default {
                        Some(default) => default.clone(),
                        None => continue,
                    },
                };
                args.push(parameter.descriptor.name.clone());
                args.push(value);
            }
        }

        Ok(args)
    }

    /// Full evaluator command line for one trial.
    pub fn render_command(&self, assignment: Option<&TrialAssignment>) -> HpResult<Vec<String>> {
        let mut command = self.invocation.command.clone();
        command.extend(self.render_arguments(assignment)?);
        Ok(command)
    }

    /// The generated wrapper module.
    pub fn render_wrapper(&self) -> String {
        let mut out = String::from(
            "from common_defs import *\nimport sys, math\nimport random\nfrom subprocess import call\n\n\n",
        );
        out.push_str(&self.space_description().to_python());
        out.push_str("\n\ndef try_params(n_iterations, params):\n    call([\n");

        let mut arg = |expr: String| {
            let _ = writeln!(out, "        {},", expr);
        };
        for part in &self.invocation.command {
            arg(py_str(part));
        }
        arg(py_str(&self.invocation.result_file.to_string_lossy()));
        arg(py_str(&self.invocation.dataset_path.to_string_lossy()));
        arg(py_str(&self.invocation.seed.to_string()));
        for (role, component) in self.components.stages() {
            arg(py_str(&component.name));
            for parameter in self.catalog.for_role(role) {
                arg(py_str(&parameter.descriptor.name));
                arg(python_value_expr(&parameter.descriptor.domain, &parameter.key));
            }
        }

        let _ = write!(
            out,
            "    ])\n    with open({}, \"r\") as result:\n        return {{'loss': float(result.read())}}\n",
            py_str(&self.invocation.result_file.to_string_lossy())
        );
        out
    }

    /// The driver entry point.
    pub fn render_main(&self, layout: &ArtifactLayout, search_budget_secs: u64) -> String {
        format!(
            "#!/usr/bin/env python\n\
             from hyperband import Hyperband\n\
             import json\n\
             from {} import get_params, try_params\n\
             \n\
             hb = Hyperband(get_params, try_params)\n\
             results = hb.run(output_path={}, timeout={})\n",
            layout.wrapper_import,
            py_str(&layout.trial_log.to_string_lossy()),
            search_budget_secs
        )
    }

    /// Write the wrapper and main script, creating directories as needed.
    ///
    /// A trial log left over from an earlier run of the same tuple is removed
    /// so it can never be mistaken for this run's output.
    pub fn write_artifacts(&self, layout: &ArtifactLayout, search_budget_secs: u64) -> HpResult<()> {
        for path in layout.paths() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| artifact_error(parent, source))?;
            }
        }

        match fs::remove_file(&layout.trial_log) {
            Ok(()) => debug!("Removed stale trial log {}", layout.trial_log.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(artifact_error(&layout.trial_log, source)),
        }

        write_artifact(&layout.wrapper_module, &self.render_wrapper())?;
        write_artifact(&layout.main_script, &self.render_main(layout, search_budget_secs))?;
        debug!(
            "Wrote {} draw rules to {}",
            self.catalog.len(),
            layout.wrapper_module.display()
        );
        Ok(())
    }
}

/// Convert a driver value to the evaluator's textual form.
pub fn format_value(domain: &ParameterDomain, key: &str, raw: &str) -> Result<String, SelectionError> {
    let invalid = || SelectionError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    };
    match domain {
        ParameterDomain::Numeric { integer: true, .. } => {
            truncate_integer(raw).map(|v| v.to_string()).ok_or_else(invalid)
        }
        ParameterDomain::Numeric { integer: false, .. } => raw
            .trim()
            .parse::<f64>()
            .map(|v| format!("{:.9}", v))
            .map_err(|_| invalid()),
        ParameterDomain::Boolean | ParameterDomain::Categorical { .. } => Ok(raw.to_string()),
    }
}

/// Parse integer or floating point text and truncate toward zero.
pub fn truncate_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    let value = text.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.trunc() as i64)
}

fn python_value_expr(domain: &ParameterDomain, key: &str) -> String {
    let lookup = format!("params[{}]", py_str(key));
    match domain {
        ParameterDomain::Numeric { integer: true, .. } => format!("str(int(float({lookup})))"),
        ParameterDomain::Numeric { integer: false, .. } => {
            format!("\"{{:.9f}}\".format(float({lookup}))")
        }
        ParameterDomain::Boolean | ParameterDomain::Categorical { .. } => format!("str({lookup})"),
    }
}

/// Double-quoted Python string literal.
fn py_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_artifact(path: &Path, contents: &str) -> HpResult<()> {
    fs::write(path, contents).map_err(|source| artifact_error(path, source))
}

fn artifact_error(path: &Path, source: io::Error) -> HpError {
    HpError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunId;
    use hp_types::{ComponentDescriptor, ParameterDescriptor};

    fn components() -> PipelineComponents {
        PipelineComponents::with_preprocessor(
            ComponentDescriptor::new("Ranker")
                .with_parameter(ParameterDescriptor::new("width", ParameterDomain::integer(1, 10))),
            ComponentDescriptor::new("ReliefF")
                .with_parameter(ParameterDescriptor::new("k", ParameterDomain::Boolean).with_default("false")),
            ComponentDescriptor::new("KStar")
                .with_parameter(
                    ParameterDescriptor::new("algo", ParameterDomain::categorical(["a", "b", "c"]))
                        .with_default("a"),
                )
                .with_parameter(ParameterDescriptor::new("blend", ParameterDomain::real(0.0, 1.0))),
        )
    }

    fn template() -> InvocationTemplate {
        InvocationTemplate {
            command: vec!["java".into(), "-jar".into(), "/env/PipelineEvaluator.jar".into()],
            result_file: PathBuf::from("/env/results/run.txt"),
            dataset_path: PathBuf::from("/data/breast-cancer.arff"),
            seed: 0,
        }
    }

    fn trial() -> TrialAssignment {
        TrialAssignment::new(0.1)
            .with_value("width_s", "7.000000000")
            .with_value("k_e", "true")
            .with_value("algo_c", "b")
            .with_value("blend_c", "0.25")
    }

    #[test]
    fn draw_rules_follow_domains() {
        assert_eq!(
            DrawRule::for_domain(&ParameterDomain::integer(1, 10)),
            DrawRule::IntUniform { low: 1, high: 10 }
        );
        assert_eq!(
            DrawRule::for_domain(&ParameterDomain::real(0.5, 2.0)),
            DrawRule::RealUniform { low: 0.5, high: 2.0 }
        );
        assert_eq!(
            DrawRule::for_domain(&ParameterDomain::Boolean),
            DrawRule::Choice {
                values: vec!["true".into(), "false".into()]
            }
        );
    }

    #[test]
    fn integer_rule_is_inclusive() {
        let rule = DrawRule::IntUniform { low: 1, high: 10 };
        assert_eq!(rule.to_python(), "np.random.choice(range(1, 11, 1))");
        let rule = DrawRule::RealUniform { low: 0.0, high: 1e-3 };
        assert_eq!(rule.to_python(), "np.random.uniform(0.0, 0.001)");
    }

    #[test]
    fn huge_integer_bound_saturates() {
        let domain = ParameterDomain::Numeric {
            min: 0.0,
            max: 1e30,
            integer: true,
        };
        let rule = DrawRule::for_domain(&domain);
        assert_eq!(rule, DrawRule::IntUniform { low: 0, high: i64::MAX });
        assert_eq!(
            rule.to_python(),
            format!("np.random.choice(range(0, {}, 1))", i64::MAX)
        );
    }

    #[test]
    fn categorical_rule_offers_exactly_its_values() {
        let rule = DrawRule::for_domain(&ParameterDomain::categorical(["a", "b", "c"]));
        assert_eq!(
            rule,
            DrawRule::Choice {
                values: vec!["a".into(), "b".into(), "c".into()]
            }
        );
        assert_eq!(rule.to_python(), r#"np.random.choice(["a", "b", "c"])"#);
    }

    #[test]
    fn literals_are_escaped() {
        let rule = DrawRule::for_domain(&ParameterDomain::categorical([r#"say "hi""#, r"a\b"]));
        assert_eq!(rule.to_python(), r#"np.random.choice(["say \"hi\"", "a\\b"])"#);
    }

    #[test]
    fn space_description_is_keyed_by_unique_name() {
        let components = components();
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let space = SpaceDescription::from_catalog(&catalog);
        assert_eq!(space.entries.len(), 4);
        assert_eq!(
            space.rule("width_s"),
            Some(&DrawRule::IntUniform { low: 1, high: 10 })
        );

        let python = space.to_python();
        assert!(python.contains(r#""k_e": np.random.choice(["true", "false"]),"#));
        assert!(python.ends_with("return handle_integers(params)\n"));
    }

    #[test]
    fn arguments_follow_pipeline_order() {
        let components = components();
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let encoder = SearchSpaceEncoder::new(&components, &catalog, template());

        let args = encoder.render_arguments(Some(&trial())).unwrap();
        assert_eq!(
            args,
            vec![
                "/env/results/run.txt",
                "/data/breast-cancer.arff",
                "0",
                "Ranker",
                "width",
                "7",
                "ReliefF",
                "k",
                "true",
                "KStar",
                "algo",
                "b",
                "blend",
                "0.250000000",
            ]
        );

        let command = encoder.render_command(Some(&trial())).unwrap();
        assert_eq!(&command[..3], &["java", "-jar", "/env/PipelineEvaluator.jar"]);
        assert_eq!(command.len(), args.len() + 3);
    }

    #[test]
    fn classifier_only_arguments() {
        let components = PipelineComponents::classifier_only(
            ComponentDescriptor::new("J48")
                .with_parameter(ParameterDescriptor::new("M", ParameterDomain::integer(1, 64))),
        );
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let encoder = SearchSpaceEncoder::new(&components, &catalog, template());

        let trial = TrialAssignment::new(0.3).with_value("M_c", "12.9");
        let args = encoder.render_arguments(Some(&trial)).unwrap();
        assert_eq!(&args[3..], &["J48", "M", "12"]);
    }

    #[test]
    fn defaults_without_assignment() {
        let components = components();
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let encoder = SearchSpaceEncoder::new(&components, &catalog, template());

        let args = encoder.render_arguments(None).unwrap();
        assert_eq!(
            &args[3..],
            &["Ranker", "ReliefF", "k", "false", "KStar", "algo", "a"]
        );
    }

    #[test]
    fn missing_assignment_value_is_reported() {
        let components = components();
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let encoder = SearchSpaceEncoder::new(&components, &catalog, template());

        let partial = TrialAssignment::new(0.2).with_value("width_s", "3");
        match encoder.render_arguments(Some(&partial)) {
            Err(HpError::Selection(SelectionError::MissingValue { key })) => assert_eq!(key, "k_e"),
            other => panic!("expected missing value, got {other:?}"),
        }
    }

    #[test]
    fn value_formatting() {
        let int = ParameterDomain::integer(1, 10);
        assert_eq!(format_value(&int, "n_c", "7.000000000").unwrap(), "7");
        assert_eq!(format_value(&int, "n_c", "-2.7").unwrap(), "-2");
        assert_eq!(format_value(&int, "n_c", "9").unwrap(), "9");
        assert!(format_value(&int, "n_c", "seven").is_err());

        let real = ParameterDomain::real(0.0, 1.0);
        assert_eq!(format_value(&real, "r_c", "0.1").unwrap(), "0.100000000");
        assert_eq!(format_value(&ParameterDomain::Boolean, "b_c", "true").unwrap(), "true");

        assert_eq!(truncate_integer(" 3.99 "), Some(3));
        assert_eq!(truncate_integer("NaN"), None);
    }

    #[test]
    fn wrapper_calls_evaluator_and_reads_loss() {
        let components = components();
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let encoder = SearchSpaceEncoder::new(&components, &catalog, template());

        let wrapper = encoder.render_wrapper();
        assert!(wrapper.starts_with("from common_defs import *\n"));
        assert!(wrapper.contains("def get_params():"));
        assert!(wrapper.contains("def try_params(n_iterations, params):"));
        assert!(wrapper.contains(r#"str(int(float(params["width_s"]))),"#));
        assert!(wrapper.contains(r#""{:.9f}".format(float(params["blend_c"]))"#));
        assert!(wrapper.contains(r#"str(params["algo_c"]),"#));
        assert!(wrapper.contains(r#"with open("/env/results/run.txt", "r") as result:"#));
        assert!(wrapper.contains("return {'loss': float(result.read())}"));

        // Evaluator arguments appear in the same order as render_arguments.
        let ranker = wrapper.find(r#""Ranker","#).unwrap();
        let relief = wrapper.find(r#""ReliefF","#).unwrap();
        let kstar = wrapper.find(r#""KStar","#).unwrap();
        assert!(ranker < relief && relief < kstar);
    }

    #[test]
    fn write_artifacts_creates_files_and_clears_stale_log() {
        let dir = tempfile::tempdir().unwrap();
        let components = components();
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let id = RunId::new(&components, "breast-cancer", 0).with_suffix("Hyperband");
        let layout = ArtifactLayout::hyperband(dir.path(), &id);
        let encoder = SearchSpaceEncoder::new(&components, &catalog, template());

        fs::create_dir_all(layout.trial_log.parent().unwrap()).unwrap();
        fs::write(&layout.trial_log, "[]").unwrap();

        encoder.write_artifacts(&layout, 120).unwrap();
        assert!(layout.wrapper_module.is_file());
        assert!(!layout.trial_log.exists());
        assert!(layout.result_file.parent().unwrap().is_dir());

        let main = fs::read_to_string(&layout.main_script).unwrap();
        assert!(main.contains(&format!("from generated.wrapper_{id} import get_params, try_params")));
        assert!(main.contains("timeout=120)"));

        // Second run of the same tuple overwrites in place.
        encoder.write_artifacts(&layout, 60).unwrap();
        let main = fs::read_to_string(&layout.main_script).unwrap();
        assert!(main.contains("timeout=60)"));
    }

    #[test]
    fn unwritable_environment_fails_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("env");
        fs::write(&blocker, "not a directory").unwrap();

        let components = components();
        let catalog = MergedCatalog::from_components(&components).unwrap();
        let id = RunId::new(&components, "iris", 0);
        let layout = ArtifactLayout::hyperband(&blocker, &id);
        let encoder = SearchSpaceEncoder::new(&components, &catalog, template());

        assert!(matches!(
            encoder.write_artifacts(&layout, 10),
            Err(HpError::ArtifactWrite { .. })
        ));
    }
}

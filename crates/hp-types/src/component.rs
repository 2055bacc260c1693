use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::{CatalogError, HpResult};

/// The set of values a parameter may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterDomain {
    /// Closed numeric range `[min, max]`.
    Numeric { min: f64, max: f64, integer: bool },
    Boolean,
    /// Finite set of literal values.
    Categorical { values: Vec<String> },
}

impl ParameterDomain {
    pub fn integer(min: i64, max: i64) -> Self {
        Self::Numeric {
            min: min as f64,
            max: max as f64,
            integer: true,
        }
    }

    pub fn real(min: f64, max: f64) -> Self {
        Self::Numeric {
            min,
            max,
            integer: false,
        }
    }

    pub fn categorical<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Categorical {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Numeric { integer: true, .. })
    }
}

impl fmt::Display for ParameterDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric { min, max, integer: true } => write!(f, "int[{min}, {max}]"),
            Self::Numeric { min, max, integer: false } => write!(f, "real[{min}, {max}]"),
            Self::Boolean => write!(f, "bool"),
            Self::Categorical { values } => write!(f, "{{{}}}", values.join(", ")),
        }
    }
}

/// A named, typed parameter of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub domain: ParameterDomain,
    /// Built-in default, in the same textual form the evaluator accepts.
    pub default: Option<String>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, domain: ParameterDomain) -> Self {
        Self {
            name: name.into(),
            domain,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A pipeline component (searcher, evaluator or classifier) and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub name: String,
    pub parameters: Vec<ParameterDescriptor>,
}

impl ComponentDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

// ---------------------------------------------------------------------------
// Catalog files
// ---------------------------------------------------------------------------

/// Components loaded from one or more repository files.
///
/// Repository files are JSON documents of the form
/// `{"repository": "...", "components": [{"name": "...", "parameter": [...]}]}`
/// where every parameter carries a `type` of `int`, `double`, `boolean` or
/// `cat`. Unknown fields (provided/required interfaces, dependencies) are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentCatalog {
    components: Vec<ComponentDescriptor>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    #[serde(default)]
    components: Vec<RawComponent>,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    name: String,
    #[serde(default, rename = "parameter")]
    parameters: Vec<RawParameter>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    values: Option<Vec<serde_json::Value>>,
}

impl ComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a single repository file.
    pub fn load<P: AsRef<Path>>(path: P) -> HpResult<Self> {
        let mut catalog = Self::new();
        catalog.load_file(path)?;
        Ok(catalog)
    }

    /// Load a repository file and append its components. Components whose
    /// name is already known are replaced.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> HpResult<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.load_str(&text)
    }

    pub fn load_str(&mut self, text: &str) -> HpResult<()> {
        let repository: RawRepository = serde_json::from_str(text)?;
        for raw in repository.components {
            let component = raw.into_descriptor()?;
            self.insert(component);
        }
        Ok(())
    }

    pub fn insert(&mut self, component: ComponentDescriptor) {
        match self.components.iter_mut().find(|c| c.name == component.name) {
            Some(existing) => *existing = component,
            None => self.components.push(component),
        }
    }

    pub fn get(&self, name: &str) -> Result<&ComponentDescriptor, CatalogError> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CatalogError::UnknownComponent {
                name: name.to_string(),
            })
    }

    pub fn components(&self) -> &[ComponentDescriptor] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Render a JSON scalar the way the evaluator expects it on its command line.
pub fn json_scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RawComponent {
    fn into_descriptor(self) -> Result<ComponentDescriptor, CatalogError> {
        let mut parameters = Vec::with_capacity(self.parameters.len());
        for raw in self.parameters {
            parameters.push(raw.into_descriptor(&self.name)?);
        }
        Ok(ComponentDescriptor {
            name: self.name,
            parameters,
        })
    }
}

impl RawParameter {
    fn into_descriptor(self, component: &str) -> Result<ParameterDescriptor, CatalogError> {
        let invalid = |message: String| CatalogError::InvalidParameter {
            component: component.to_string(),
            parameter: self.name.clone(),
            message,
        };

        let domain = match self.kind.as_str() {
            "int" | "double" | "float" => {
                let (min, max) = match (self.min, self.max) {
                    (Some(min), Some(max)) => (min, max),
                    _ => return Err(invalid("numeric parameter needs min and max".into())),
                };
                if min > max {
                    return Err(invalid(format!("min {min} exceeds max {max}")));
                }
                ParameterDomain::Numeric {
                    min,
                    max,
                    integer: self.kind == "int",
                }
            }
            "boolean" | "bool" => ParameterDomain::Boolean,
            "cat" | "categorical" => {
                let values = match &self.values {
                    Some(values) if !values.is_empty() => {
                        values.iter().map(json_scalar_text).collect()
                    }
                    _ => return Err(invalid("categorical parameter needs values".into())),
                };
                ParameterDomain::Categorical { values }
            }
            other => return Err(invalid(format!("unsupported type {other:?}"))),
        };

        // Boolean defaults are always lower case on the evaluator side.
        let boolean = matches!(domain, ParameterDomain::Boolean);
        let default = self.default.as_ref().map(|v| {
            let text = json_scalar_text(v);
            if boolean {
                text.to_lowercase()
            } else {
                text
            }
        });

        Ok(ParameterDescriptor {
            name: self.name,
            domain,
            default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HpError;
    use std::io::Write;

    const CLASSIFIERS: &str = r#"{
        "repository": "test classifiers",
        "components": [
            {
                "name": "weka.classifiers.lazy.KStar",
                "providedInterface": ["AbstractClassifier"],
                "parameter": [
                    {"name": "B", "type": "int", "default": 20, "min": 1, "max": 100},
                    {"name": "E", "type": "boolean", "default": "False"},
                    {"name": "M", "type": "cat", "default": "a", "values": ["a", "d", "m", "n"]}
                ]
            },
            {
                "name": "weka.classifiers.functions.Logistic",
                "parameter": [
                    {"name": "R", "type": "double", "default": 1.0E-8, "min": 1.0E-12, "max": 10.0}
                ]
            }
        ]
    }"#;

    #[test]
    fn loads_repository_components() {
        let mut catalog = ComponentCatalog::new();
        catalog.load_str(CLASSIFIERS).unwrap();
        assert_eq!(catalog.len(), 2);

        let kstar = catalog.get("weka.classifiers.lazy.KStar").unwrap();
        assert_eq!(kstar.parameters.len(), 3);
        assert_eq!(kstar.parameters[0].domain, ParameterDomain::integer(1, 100));
        assert_eq!(kstar.parameters[0].default.as_deref(), Some("20"));
        assert_eq!(kstar.parameters[1].domain, ParameterDomain::Boolean);
        assert_eq!(kstar.parameters[1].default.as_deref(), Some("false"));
        assert_eq!(
            kstar.parameter("M").unwrap().domain,
            ParameterDomain::categorical(["a", "d", "m", "n"])
        );

        let logistic = catalog.get("weka.classifiers.functions.Logistic").unwrap();
        assert!(!logistic.parameters[0].domain.is_integer());
    }

    #[test]
    fn unknown_component_is_reported() {
        let catalog = ComponentCatalog::new();
        match catalog.get("weka.classifiers.trees.J48") {
            Err(CatalogError::UnknownComponent { name }) => {
                assert_eq!(name, "weka.classifiers.trees.J48")
            }
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn numeric_parameter_without_bounds_is_rejected() {
        let text = r#"{"components": [{"name": "X", "parameter": [{"name": "k", "type": "int"}]}]}"#;
        let mut catalog = ComponentCatalog::new();
        match catalog.load_str(text) {
            Err(HpError::Catalog(CatalogError::InvalidParameter { parameter, .. })) => {
                assert_eq!(parameter, "k")
            }
            other => panic!("expected invalid parameter, got {other:?}"),
        }
    }

    #[test]
    fn later_files_replace_components() {
        let mut catalog = ComponentCatalog::new();
        catalog.load_str(CLASSIFIERS).unwrap();
        catalog
            .load_str(r#"{"components": [{"name": "weka.classifiers.lazy.KStar"}]}"#)
            .unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog
            .get("weka.classifiers.lazy.KStar")
            .unwrap()
            .parameters
            .is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CLASSIFIERS.as_bytes()).unwrap();
        let catalog = ComponentCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.components().len(), 2);

        let missing = ComponentCatalog::load(file.path().with_extension("missing"));
        assert!(matches!(
            missing,
            Err(HpError::Catalog(CatalogError::Unreadable { .. }))
        ));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::component::ComponentDescriptor;

/// The stage a component plays in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Searcher,
    Evaluator,
    Classifier,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Searcher, Role::Evaluator, Role::Classifier];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Searcher => "searcher",
            Role::Evaluator => "evaluator",
            Role::Classifier => "classifier",
        };
        write!(f, "{}", s)
    }
}

/// Attribute-selection preprocessor: a searcher and an evaluator always come
/// together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub searcher: ComponentDescriptor,
    pub evaluator: ComponentDescriptor,
}

/// The components of a pipeline to optimize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineComponents {
    pub preprocessor: Option<Preprocessor>,
    pub classifier: ComponentDescriptor,
}

impl PipelineComponents {
    pub fn classifier_only(classifier: ComponentDescriptor) -> Self {
        Self {
            preprocessor: None,
            classifier,
        }
    }

    pub fn with_preprocessor(
        searcher: ComponentDescriptor,
        evaluator: ComponentDescriptor,
        classifier: ComponentDescriptor,
    ) -> Self {
        Self {
            preprocessor: Some(Preprocessor {
                searcher,
                evaluator,
            }),
            classifier,
        }
    }

    /// Present components in pipeline order, tagged with their role.
    pub fn stages(&self) -> Vec<(Role, &ComponentDescriptor)> {
        let mut stages = Vec::with_capacity(3);
        if let Some(pre) = &self.preprocessor {
            stages.push((Role::Searcher, &pre.searcher));
            stages.push((Role::Evaluator, &pre.evaluator));
        }
        stages.push((Role::Classifier, &self.classifier));
        stages
    }

    pub fn component(&self, role: Role) -> Option<&ComponentDescriptor> {
        match role {
            Role::Searcher => self.preprocessor.as_ref().map(|p| &p.searcher),
            Role::Evaluator => self.preprocessor.as_ref().map(|p| &p.evaluator),
            Role::Classifier => Some(&self.classifier),
        }
    }
}

/// Decoded parameter values for one stage, keyed by bare parameter name.
///
/// An empty map means "use the component's built-in defaults".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfiguration {
    pub component: String,
    pub parameters: BTreeMap<String, String>,
}

impl StageConfiguration {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

impl fmt::Display for StageConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component)?;
        for (name, value) in &self.parameters {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}

/// The outcome of a successful optimization: one configuration per present
/// stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedPipeline {
    pub searcher: Option<StageConfiguration>,
    pub evaluator: Option<StageConfiguration>,
    pub classifier: StageConfiguration,
}

impl OptimizedPipeline {
    /// Every present stage with an empty parameter map.
    pub fn defaults(components: &PipelineComponents) -> Self {
        let pre = components.preprocessor.as_ref();
        Self {
            searcher: pre.map(|p| StageConfiguration::new(&p.searcher.name)),
            evaluator: pre.map(|p| StageConfiguration::new(&p.evaluator.name)),
            classifier: StageConfiguration::new(&components.classifier.name),
        }
    }

    pub fn stage(&self, role: Role) -> Option<&StageConfiguration> {
        match role {
            Role::Searcher => self.searcher.as_ref(),
            Role::Evaluator => self.evaluator.as_ref(),
            Role::Classifier => Some(&self.classifier),
        }
    }

    pub fn stage_mut(&mut self, role: Role) -> Option<&mut StageConfiguration> {
        match role {
            Role::Searcher => self.searcher.as_mut(),
            Role::Evaluator => self.evaluator.as_mut(),
            Role::Classifier => Some(&mut self.classifier),
        }
    }

    /// Compose the stage configurations into the instance tree handed to the
    /// pipeline factory.
    pub fn to_instance(&self) -> ComponentInstance {
        let classifier = ComponentInstance::from_stage(&self.classifier);
        match (&self.searcher, &self.evaluator) {
            (Some(searcher), Some(evaluator)) => {
                let preprocessor = ComponentInstance::new("preprocessor")
                    .with_requirement("eval", ComponentInstance::from_stage(evaluator))
                    .with_requirement("search", ComponentInstance::from_stage(searcher));
                ComponentInstance::new("pipeline")
                    .with_requirement("preprocessor", preprocessor)
                    .with_requirement("classifier", classifier)
            }
            _ => classifier,
        }
    }
}

/// A component with concrete parameter values and the instances satisfying
/// its required interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub component: String,
    pub parameters: BTreeMap<String, String>,
    pub satisfied_interfaces: BTreeMap<String, ComponentInstance>,
}

impl ComponentInstance {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            parameters: BTreeMap::new(),
            satisfied_interfaces: BTreeMap::new(),
        }
    }

    pub fn from_stage(stage: &StageConfiguration) -> Self {
        Self {
            component: stage.component.clone(),
            parameters: stage.parameters.clone(),
            satisfied_interfaces: BTreeMap::new(),
        }
    }

    pub fn with_requirement(mut self, interface: impl Into<String>, instance: ComponentInstance) -> Self {
        self.satisfied_interfaces.insert(interface.into(), instance);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components() -> PipelineComponents {
        PipelineComponents::with_preprocessor(
            ComponentDescriptor::new("weka.attributeSelection.Ranker"),
            ComponentDescriptor::new("weka.attributeSelection.ReliefFAttributeEval"),
            ComponentDescriptor::new("weka.classifiers.lazy.KStar"),
        )
    }

    #[test]
    fn stages_follow_pipeline_order() {
        let components = components();
        let roles: Vec<Role> = components.stages().iter().map(|(r, _)| *r).collect();
        assert_eq!(roles, Role::ALL.to_vec());

        let bare = PipelineComponents::classifier_only(ComponentDescriptor::new("J48"));
        assert_eq!(bare.stages().len(), 1);
        assert!(bare.component(Role::Searcher).is_none());
    }

    #[test]
    fn defaults_have_empty_parameters() {
        let pipeline = OptimizedPipeline::defaults(&components());
        for role in Role::ALL {
            let stage = pipeline.stage(role).unwrap();
            assert!(stage.parameters.is_empty());
        }
        assert_eq!(pipeline.classifier.component, "weka.classifiers.lazy.KStar");
    }

    #[test]
    fn instance_tree_with_preprocessor() {
        let mut pipeline = OptimizedPipeline::defaults(&components());
        pipeline
            .stage_mut(Role::Classifier)
            .unwrap()
            .parameters
            .insert("B".into(), "20".into());

        let root = pipeline.to_instance();
        assert_eq!(root.component, "pipeline");
        let pre = &root.satisfied_interfaces["preprocessor"];
        assert_eq!(
            pre.satisfied_interfaces["search"].component,
            "weka.attributeSelection.Ranker"
        );
        assert_eq!(
            pre.satisfied_interfaces["eval"].component,
            "weka.attributeSelection.ReliefFAttributeEval"
        );
        assert_eq!(
            root.satisfied_interfaces["classifier"].parameters["B"],
            "20"
        );
    }

    #[test]
    fn instance_tree_without_preprocessor_is_the_classifier() {
        let components = PipelineComponents::classifier_only(ComponentDescriptor::new("J48"));
        let pipeline = OptimizedPipeline::defaults(&components);
        let root = pipeline.to_instance();
        assert_eq!(root.component, "J48");
        assert!(root.satisfied_interfaces.is_empty());
    }

    #[test]
    fn stage_display_lists_parameters() {
        let stage = StageConfiguration::new("KStar")
            .with_parameter("B", "20")
            .with_parameter("E", "true");
        assert_eq!(stage.to_string(), "KStar B=20 E=true");
        assert_eq!(stage.get("E"), Some("true"));
    }
}

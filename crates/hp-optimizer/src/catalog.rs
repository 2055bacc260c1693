//! The merged, role-disambiguated parameter catalog of a pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use hp_types::{config_error, HpResult, ParameterDescriptor, PipelineComponents, Role};

use crate::naming;

/// A component parameter published under its role-tagged key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedParameter {
    pub role: Role,
    pub descriptor: ParameterDescriptor,
    pub key: String,
}

/// All parameters of the present stages, in pipeline then declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedCatalog {
    pub parameters: Vec<MergedParameter>,
}

impl MergedCatalog {
    pub fn from_components(components: &PipelineComponents) -> HpResult<Self> {
        let mut seen = HashSet::new();
        let mut parameters = Vec::new();

        for (role, component) in components.stages() {
            for descriptor in &component.parameters {
                let key = naming::encode(&descriptor.name, role);
                if !seen.insert(key.clone()) {
                    return Err(config_error!(
                        "{} declares parameter {} more than once",
                        component.name,
                        descriptor.name
                    ));
                }
                parameters.push(MergedParameter {
                    role,
                    descriptor: descriptor.clone(),
                    key,
                });
            }
        }

        Ok(Self { parameters })
    }

    pub fn for_role(&self, role: Role) -> impl Iterator<Item = &MergedParameter> {
        self.parameters.iter().filter(move |p| p.role == role)
    }

    pub fn get(&self, key: &str) -> Option<&MergedParameter> {
        self.parameters.iter().find(|p| p.key == key)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

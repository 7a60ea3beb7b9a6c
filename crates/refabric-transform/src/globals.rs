//! Global parameter extraction and Variable Library construction
//!
//! ADF global parameters have no direct Fabric equivalent; usages across
//! all pipelines are collected into one Variable Library definition, and
//! the expressions that referenced them are rewritten to library-variable
//! form by the transformer.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use refabric_parser::TemplateIndex;

use crate::expression::collect_global_parameters;

/// The value ADF exports for secrets it will not serialize. A library
/// variable still carrying it must never be deployed as-is.
pub const SECRET_PLACEHOLDER: &str = "SECRET";

/// ADF global parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdfParameterType {
    String,
    Int,
    Float,
    Bool,
    Array,
    Object,
    SecureString,
}

impl AdfParameterType {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "int" => Self::Int,
            "float" => Self::Float,
            "bool" => Self::Bool,
            "array" => Self::Array,
            "object" => Self::Object,
            "securestring" => Self::SecureString,
            _ => Self::String,
        }
    }
}

/// The Fabric variable types a parameter can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FabricVariableType {
    String,
    Integer,
    Number,
    Boolean,
}

impl From<AdfParameterType> for FabricVariableType {
    fn from(adf: AdfParameterType) -> Self {
        match adf {
            AdfParameterType::Int => Self::Integer,
            AdfParameterType::Float => Self::Number,
            AdfParameterType::Bool => Self::Boolean,
            _ => Self::String,
        }
    }
}

/// One distinct global parameter usage found in the template.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterReference {
    pub name: String,
    pub param_type: AdfParameterType,
    /// Declared value from the factory resource, when present.
    pub value: Option<Value>,
    /// Names of the pipelines referencing this parameter, sorted.
    pub pipelines: Vec<String>,
    /// True when the parameter is used but not declared on the factory
    /// resource; its type defaulted to String.
    pub undeclared: bool,
}

/// A deployable Variable Library definition.
#[derive(Debug, Clone, Serialize)]
pub struct VariableLibrary {
    pub name: String,
    pub description: String,
    pub variables: Vec<LibraryVariable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: FabricVariableType,
    pub value: Value,
    pub secure: bool,
}

/// A variable that must be fixed before the library may be deployed.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentBlocker {
    pub variable: String,
    pub reason: String,
}

/// Scan every pipeline in the template for global parameter usages.
/// Produces one reference per distinct parameter name, in name order.
pub fn extract_global_parameters(index: &TemplateIndex) -> Vec<ParameterReference> {
    let mut usage: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for pipeline in index.pipelines() {
        let mut names = BTreeSet::new();
        collect_global_parameters(&pipeline.properties, &mut names);
        for name in names {
            usage.entry(name).or_default().insert(pipeline.name.clone());
        }
    }

    usage
        .into_iter()
        .map(|(name, pipelines)| {
            let declared = index.global_parameters().get(&name);
            if declared.is_none() {
                debug!(parameter = %name, "global parameter used but not declared; defaulting to String");
            }
            ParameterReference {
                param_type: declared
                    .map(|spec| AdfParameterType::parse(&spec.param_type))
                    .unwrap_or(AdfParameterType::String),
                value: declared.and_then(|spec| spec.value.clone()),
                pipelines: pipelines.into_iter().collect(),
                undeclared: declared.is_none(),
                name,
            }
        })
        .collect()
}

/// Build the Variable Library for a set of parameter references. Every
/// variable carries a concrete default value; what it defaults to when the
/// export carried none depends on the type (`false` for Bool, `0` for
/// Int/Float, empty string otherwise).
pub fn build_variable_library(
    references: &[ParameterReference],
    name: impl Into<String>,
    description: impl Into<String>,
) -> VariableLibrary {
    VariableLibrary {
        name: name.into(),
        description: description.into(),
        variables: references
            .iter()
            .map(|reference| LibraryVariable {
                name: reference.name.clone(),
                variable_type: reference.param_type.into(),
                value: default_value(reference),
                secure: reference.param_type == AdfParameterType::SecureString,
            })
            .collect(),
    }
}

fn default_value(reference: &ParameterReference) -> Value {
    let declared = reference.value.as_ref().filter(|value| !value.is_null());
    match reference.param_type {
        AdfParameterType::Bool => {
            Value::Bool(declared.and_then(Value::as_bool).unwrap_or(false))
        }
        AdfParameterType::Int => declared
            .and_then(Value::as_i64)
            .map(Value::from)
            .unwrap_or_else(|| Value::from(0)),
        AdfParameterType::Float => declared
            .and_then(Value::as_f64)
            .map(Value::from)
            .unwrap_or_else(|| Value::from(0.0)),
        AdfParameterType::Array | AdfParameterType::Object => {
            Value::String(declared.map(Value::to_string).unwrap_or_default())
        }
        AdfParameterType::SecureString => Value::String(
            declared
                .and_then(Value::as_str)
                .unwrap_or(SECRET_PLACEHOLDER)
                .to_string(),
        ),
        AdfParameterType::String => Value::String(declared.map(value_text).unwrap_or_default()),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl VariableLibrary {
    /// Secure variables whose only known value is the export placeholder.
    /// A non-empty result must block deployment of the library.
    pub fn deployment_blockers(&self) -> Vec<DeploymentBlocker> {
        self.variables
            .iter()
            .filter(|variable| {
                variable.secure
                    && variable
                        .value
                        .as_str()
                        .map_or(true, |text| text.is_empty() || text == SECRET_PLACEHOLDER)
            })
            .map(|variable| DeploymentBlocker {
                variable: variable.name.clone(),
                reason: "secure value is the export placeholder; set a real secret before deployment"
                    .into(),
            })
            .collect()
    }

    /// Parameter name → replacement expression path, consumed by the
    /// transformer's textual rewrite.
    pub fn rewrite_map(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|variable| {
                (
                    variable.name.clone(),
                    format!("pipeline().libraryVariables.{}.{}", self.name, variable.name),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn index_with_globals() -> TemplateIndex {
        TemplateIndex::from_json(&json!({
            "resources": [
                {
                    "name": "[parameters('factoryName')]",
                    "type": "Microsoft.DataFactory/factories",
                    "properties": {
                        "globalParameters": {
                            "gp_Environment": { "type": "String", "value": "prod" },
                            "gp_Retries": { "type": "Int", "value": 3 },
                            "gp_Enabled": { "type": "Bool" },
                            "gp_ApiKey": { "type": "SecureString", "value": "SECRET" }
                        }
                    }
                },
                {
                    "name": "f/IngestOrders",
                    "type": "Microsoft.DataFactory/factories/pipelines",
                    "properties": {
                        "activities": [{
                            "name": "CallApi",
                            "type": "WebActivity",
                            "typeProperties": {
                                "url": "@pipeline().globalParameters.gp_Environment",
                                "headers": { "x-key": "@pipeline().globalParameters.gp_ApiKey" },
                                "retries": "@pipeline().globalParameters.gp_Retries",
                                "enabled": "@pipeline().globalParameters.gp_Enabled"
                            }
                        }]
                    }
                },
                {
                    "name": "f/Nightly",
                    "type": "Microsoft.DataFactory/factories/pipelines",
                    "properties": {
                        "activities": [{
                            "name": "Env",
                            "type": "SetVariable",
                            "typeProperties": {
                                "value": "@pipeline().globalParameters.gp_Environment"
                            }
                        }]
                    }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn extraction_is_distinct_and_sorted() {
        let references = extract_global_parameters(&index_with_globals());
        let names: Vec<_> = references.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["gp_ApiKey", "gp_Enabled", "gp_Environment", "gp_Retries"]);

        let environment = &references[2];
        assert_eq!(environment.pipelines, vec!["IngestOrders", "Nightly"]);
        assert_eq!(environment.param_type, AdfParameterType::String);
        assert!(!environment.undeclared);
    }

    #[test]
    fn type_mapping_matches_fabric() {
        let references = extract_global_parameters(&index_with_globals());
        let library = build_variable_library(&references, "Migrated", "from ADF globals");
        let by_name: BTreeMap<_, _> = library
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v))
            .collect();

        assert_eq!(by_name["gp_Retries"].variable_type, FabricVariableType::Integer);
        assert_eq!(by_name["gp_Enabled"].variable_type, FabricVariableType::Boolean);
        assert_eq!(by_name["gp_Environment"].variable_type, FabricVariableType::String);
        assert_eq!(by_name["gp_ApiKey"].variable_type, FabricVariableType::String);
    }

    #[test]
    fn valueless_bool_defaults_to_false() {
        let references = extract_global_parameters(&index_with_globals());
        let library = build_variable_library(&references, "Migrated", "");
        let enabled = library
            .variables
            .iter()
            .find(|v| v.name == "gp_Enabled")
            .unwrap();
        assert_eq!(enabled.value, json!(false));
    }

    #[test]
    fn placeholder_secret_blocks_deployment() {
        let references = extract_global_parameters(&index_with_globals());
        let library = build_variable_library(&references, "Migrated", "");
        let blockers = library.deployment_blockers();
        assert_eq!(blockers.len(), 1);
        assert_eq!(blockers[0].variable, "gp_ApiKey");
    }

    #[test]
    fn rewrite_map_is_library_qualified() {
        let references = extract_global_parameters(&index_with_globals());
        let library = build_variable_library(&references, "Migrated", "");
        let rewrites = library.rewrite_map();
        assert_eq!(
            rewrites["gp_Environment"],
            "pipeline().libraryVariables.Migrated.gp_Environment"
        );
    }

    #[test]
    fn undeclared_usage_defaults_to_string() {
        let index = TemplateIndex::from_json(&json!({
            "resources": [{
                "name": "f/P",
                "type": "Microsoft.DataFactory/factories/pipelines",
                "properties": {
                    "activities": [{
                        "name": "A",
                        "type": "SetVariable",
                        "typeProperties": { "value": "@pipeline().globalParameters.gp_Mystery" }
                    }]
                }
            }]
        }))
        .unwrap();
        let references = extract_global_parameters(&index);
        assert_eq!(references.len(), 1);
        assert!(references[0].undeclared);
        assert_eq!(references[0].param_type, AdfParameterType::String);
    }
}

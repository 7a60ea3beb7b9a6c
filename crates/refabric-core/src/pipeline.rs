//! Pipeline definitions: a named, ordered list of top-level activities

use crate::activity::{parse_activities, Activity};
use crate::component::{Component, ComponentKind};
use crate::error::CoreError;
use serde_json::{Map, Value};

/// A pipeline definition parsed out of a template component. Owns its
/// top-level activities; nested activities are owned by their container.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub name: String,
    pub activities: Vec<Activity>,
    pub parameters: Option<Value>,
    pub variables: Option<Value>,
    /// Remaining `properties` keys (folder, annotations, concurrency, ...),
    /// preserved verbatim.
    pub extra: Map<String, Value>,
}

impl Pipeline {
    /// Parse a pipeline from its template component.
    pub fn from_component(component: &Component) -> Result<Self, CoreError> {
        debug_assert_eq!(component.kind, ComponentKind::Pipeline);
        let props = component.properties.as_object().ok_or_else(|| {
            CoreError::invalid_pipeline(&component.name, "`properties` is not an object")
        })?;

        let mut pipeline = Self {
            name: component.name.clone(),
            activities: Vec::new(),
            parameters: None,
            variables: None,
            extra: Map::new(),
        };
        for (key, value) in props {
            match key.as_str() {
                "activities" => {
                    pipeline.activities = parse_activities(&component.name, "activities", value)?;
                }
                "parameters" => pipeline.parameters = Some(value.clone()),
                "variables" => pipeline.variables = Some(value.clone()),
                _ => {
                    pipeline.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(pipeline)
    }

    /// Serialize to the output document shape: `{ name, properties }`.
    pub fn to_value(&self) -> Value {
        let mut props = Map::new();
        props.insert(
            "activities".into(),
            Value::Array(self.activities.iter().map(Activity::to_value).collect()),
        );
        if let Some(parameters) = &self.parameters {
            props.insert("parameters".into(), parameters.clone());
        }
        if let Some(variables) = &self.variables {
            props.insert("variables".into(), variables.clone());
        }
        for (key, value) in &self.extra {
            props.insert(key.clone(), value.clone());
        }

        let mut obj = Map::new();
        obj.insert("name".into(), Value::String(self.name.clone()));
        obj.insert("properties".into(), Value::Object(props));
        Value::Object(obj)
    }

    pub fn activity(&self, name: &str) -> Option<&Activity> {
        self.activities.iter().find(|activity| activity.name == name)
    }
}

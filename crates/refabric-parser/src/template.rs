//! Template index: one parse of the ARM export into name-keyed component maps
//!
//! The index is the arena every later stage looks names up in. Components
//! are created once here and never mutated; the transformer and resolvers
//! borrow them by name.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use refabric_core::{Component, ComponentKind, GlobalParameterSpec};

use crate::error::ParseError;

const FACTORY_RESOURCE_TYPE: &str = "Microsoft.DataFactory/factories";

/// ADF exports name child resources as
/// `[concat(parameters('factoryName'), '/CopyOrders')]`. Only this concat
/// subset is understood; general ARM expression evaluation is out of scope.
static CONCAT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^concat\(parameters\('[^']+'\),\s*'/([^']+)'\)$").expect("static pattern")
});

/// Name-keyed lookup of every component in one ARM template.
#[derive(Debug, Default)]
pub struct TemplateIndex {
    pipelines: BTreeMap<String, Component>,
    datasets: BTreeMap<String, Component>,
    linked_services: BTreeMap<String, Component>,
    triggers: BTreeMap<String, Component>,
    global_parameters: BTreeMap<String, GlobalParameterSpec>,
}

impl TemplateIndex {
    /// Build the index from a parsed ARM template document.
    pub fn from_json(template: &Value) -> Result<Self, ParseError> {
        let root = template.as_object().ok_or(ParseError::NotAnObject)?;
        let resources = root
            .get("resources")
            .and_then(Value::as_array)
            .ok_or(ParseError::MissingResources)?;

        let mut index = Self::default();
        for (position, resource) in resources.iter().enumerate() {
            let raw_name = resource
                .get("name")
                .and_then(Value::as_str)
                .ok_or(ParseError::MissingResourceField {
                    index: position,
                    field: "name",
                })?;
            let resource_type = resource
                .get("type")
                .and_then(Value::as_str)
                .ok_or(ParseError::MissingResourceField {
                    index: position,
                    field: "type",
                })?;
            let properties = resource.get("properties").cloned().unwrap_or(Value::Null);

            if resource_type == FACTORY_RESOURCE_TYPE {
                index.read_global_parameters(&properties)?;
                continue;
            }

            let Some(kind) = ComponentKind::from_resource_type(resource_type) else {
                debug!(resource_type, "skipping resource of unhandled type");
                continue;
            };
            let name = component_name(raw_name);
            debug!(%kind, %name, "indexed component");

            let component = Component {
                name: name.clone(),
                kind,
                properties,
            };
            let map = index.map_for_mut(kind);
            if map.insert(name.clone(), component).is_some() {
                return Err(ParseError::DuplicateComponent { kind, name });
            }
        }
        Ok(index)
    }

    /// Parse and index a raw template string.
    pub fn from_str(template: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(template)?;
        Self::from_json(&value)
    }

    fn read_global_parameters(&mut self, factory_properties: &Value) -> Result<(), ParseError> {
        let Some(params) = factory_properties
            .get("globalParameters")
            .and_then(Value::as_object)
        else {
            return Ok(());
        };
        for (name, spec) in params {
            let spec: GlobalParameterSpec =
                serde_json::from_value(spec.clone()).map_err(|err| {
                    ParseError::MalformedGlobalParameter {
                        name: name.clone(),
                        message: err.to_string(),
                    }
                })?;
            self.global_parameters.insert(name.clone(), spec);
        }
        Ok(())
    }

    fn map_for_mut(&mut self, kind: ComponentKind) -> &mut BTreeMap<String, Component> {
        match kind {
            ComponentKind::Pipeline => &mut self.pipelines,
            ComponentKind::Dataset => &mut self.datasets,
            ComponentKind::LinkedService => &mut self.linked_services,
            ComponentKind::Trigger => &mut self.triggers,
        }
    }

    pub fn pipeline(&self, name: &str) -> Option<&Component> {
        self.pipelines.get(name)
    }

    pub fn dataset(&self, name: &str) -> Option<&Component> {
        self.datasets.get(name)
    }

    pub fn linked_service(&self, name: &str) -> Option<&Component> {
        self.linked_services.get(name)
    }

    pub fn trigger(&self, name: &str) -> Option<&Component> {
        self.triggers.get(name)
    }

    /// Pipelines in name order, so downstream diagnostics are deterministic.
    pub fn pipelines(&self) -> impl Iterator<Item = &Component> {
        self.pipelines.values()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Component> {
        self.triggers.values()
    }

    pub fn global_parameters(&self) -> &BTreeMap<String, GlobalParameterSpec> {
        &self.global_parameters
    }

    pub fn counts(&self) -> ComponentCounts {
        ComponentCounts {
            pipelines: self.pipelines.len(),
            datasets: self.datasets.len(),
            linked_services: self.linked_services.len(),
            triggers: self.triggers.len(),
            global_parameters: self.global_parameters.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentCounts {
    pub pipelines: usize,
    pub datasets: usize,
    pub linked_services: usize,
    pub triggers: usize,
    pub global_parameters: usize,
}

/// Normalize an ARM resource name to the bare component name.
fn component_name(raw: &str) -> String {
    if let Some(expr) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if let Some(captures) = CONCAT_NAME.captures(expr.trim()) {
            return captures[1].to_string();
        }
        // Unrecognized name expression: keep it verbatim rather than guess.
        return raw.to_string();
    }
    match raw.rsplit_once('/') {
        Some((_, tail)) => tail.to_string(),
        None => raw.to_string(),
    }
}

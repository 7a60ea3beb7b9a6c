//! Named ARM components owned by the template index

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource kinds the migration engine understands. Every other ARM
/// resource type in an export is ignored at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Pipeline,
    Dataset,
    LinkedService,
    Trigger,
}

impl ComponentKind {
    /// Map an ARM `type` field (e.g. `Microsoft.DataFactory/factories/pipelines`)
    /// to a component kind.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type.rsplit('/').next()? {
            "pipelines" => Some(Self::Pipeline),
            "datasets" => Some(Self::Dataset),
            "linkedservices" | "linkedServices" => Some(Self::LinkedService),
            "triggers" => Some(Self::Trigger),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Dataset => "dataset",
            Self::LinkedService => "linked service",
            Self::Trigger => "trigger",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named ARM resource. Created once at parse time and immutable
/// thereafter; the template index owns every instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    /// Raw `properties` object from the ARM resource. Opaque at this
    /// layer; the resolver and transformer interpret the parts they need.
    pub properties: Value,
}

/// A global parameter declaration from the factory resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalParameterSpec {
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_mapping() {
        assert_eq!(
            ComponentKind::from_resource_type("Microsoft.DataFactory/factories/pipelines"),
            Some(ComponentKind::Pipeline)
        );
        assert_eq!(
            ComponentKind::from_resource_type("Microsoft.DataFactory/factories/linkedServices"),
            Some(ComponentKind::LinkedService)
        );
        assert_eq!(
            ComponentKind::from_resource_type("Microsoft.DataFactory/factories"),
            None
        );
    }
}

//! Dataset references and their inlined replacements

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named pointer from an activity to a dataset definition, with
/// call-site parameters. Resolved (never mutated) at transform time; the
/// reference itself does not survive into the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReference {
    #[serde(rename = "referenceName")]
    pub reference_name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// Remaining reference fields (`type: "DatasetReference"` and friends),
    /// preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatasetReference {
    pub fn named(reference_name: impl Into<String>) -> Self {
        Self {
            reference_name: reference_name.into(),
            parameters: Map::new(),
            extra: Map::new(),
        }
    }
}

/// The merged, self-contained replacement for a dataset reference: the
/// dataset's type and type properties with call-site parameters
/// substituted in and the backing store identifier populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSettings {
    #[serde(rename = "type")]
    pub dataset_type: String,
    #[serde(rename = "typeProperties")]
    pub type_properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatasetSettings {
    /// Serialize to the JSON object embedded under
    /// `typeProperties.source/sink.datasetSettings`.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(self.dataset_type.clone()));
        obj.insert("typeProperties".into(), self.type_properties.clone());
        if let Some(schema) = &self.schema {
            obj.insert("schema".into(), schema.clone());
        }
        for (key, value) in &self.extra {
            obj.insert(key.clone(), value.clone());
        }
        Value::Object(obj)
    }

    pub fn location(&self) -> Option<&Value> {
        self.type_properties.get("location")
    }

    /// The store identifier of the resolved location: `fileSystem` for
    /// ADLS-style locations, `container` for blob-style ones.
    pub fn store_identifier(&self) -> Option<&str> {
        let location = self.location()?;
        location
            .get("fileSystem")
            .or_else(|| location.get("container"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Output of the dataset reference resolver: the settings plus any
/// expressions that were passed through unrecognized.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDataset {
    pub settings: DatasetSettings,
    pub diagnostics: Vec<String>,
}

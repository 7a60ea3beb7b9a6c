//! Dataset reference resolution
//!
//! Turns a `{ referenceName, parameters }` pointer into the self-contained
//! `datasetSettings` object Fabric expects: dataset type, location with
//! call-site parameters substituted in, and the backing store identifier
//! derived from the linked service when the dataset itself omits it.

use serde_json::{Map, Value};
use tracing::debug;

use refabric_core::{DatasetReference, DatasetSettings, ResolvedDataset};
use refabric_parser::TemplateIndex;

use crate::error::DatasetResolveError;
use crate::expression::substitute_dataset_expression;

/// Resolve one dataset reference against the template index.
///
/// Deterministic: the same reference, parameters, and index always produce
/// the same settings. Unknown references are errors, never partial output.
pub fn resolve_dataset(
    reference: &DatasetReference,
    index: &TemplateIndex,
) -> Result<ResolvedDataset, DatasetResolveError> {
    let dataset_name = reference.reference_name.as_str();
    let component = index
        .dataset(dataset_name)
        .ok_or_else(|| DatasetResolveError::UnknownDataset(dataset_name.to_string()))?;
    let props = component.properties.as_object().ok_or_else(|| {
        DatasetResolveError::MalformedDataset {
            dataset: dataset_name.to_string(),
            message: "`properties` is not an object".into(),
        }
    })?;
    let dataset_type = props
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DatasetResolveError::MalformedDataset {
            dataset: dataset_name.to_string(),
            message: "missing `type`".into(),
        })?
        .to_string();

    let parameters = merged_parameters(props, &reference.parameters);
    let mut diagnostics = Vec::new();
    let mut type_properties = props
        .get("typeProperties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(Value::Object(location)) = type_properties.get_mut("location") {
        substitute_location(location, &parameters, &mut diagnostics);
        if store_identifier(location).is_none() {
            derive_store(dataset_name, props, location, index)?;
        }
    }

    debug!(dataset = dataset_name, %dataset_type, "resolved dataset reference");
    Ok(ResolvedDataset {
        settings: DatasetSettings {
            dataset_type,
            type_properties: Value::Object(type_properties),
            schema: props.get("schema").cloned(),
            extra: Map::new(),
        },
        diagnostics,
    })
}

/// Dataset-declared parameter defaults overlaid with the call-site
/// parameters; the call site wins.
fn merged_parameters(
    props: &Map<String, Value>,
    call_site: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    if let Some(declared) = props.get("parameters").and_then(Value::as_object) {
        for (name, spec) in declared {
            if let Some(default) = spec.get("defaultValue") {
                merged.insert(name.clone(), default.clone());
            }
        }
    }
    for (name, value) in call_site {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

fn substitute_location(
    location: &mut Map<String, Value>,
    parameters: &Map<String, Value>,
    diagnostics: &mut Vec<String>,
) {
    for value in location.values_mut() {
        if let Value::String(text) = value {
            *value = substitute_dataset_expression(text, parameters, diagnostics);
        }
    }
}

fn store_identifier(location: &Map<String, Value>) -> Option<&str> {
    location
        .get("fileSystem")
        .or_else(|| location.get("container"))
        .and_then(Value::as_str)
        .filter(|identifier| !identifier.is_empty())
}

/// Populate the location's store identifier from the linked service the
/// dataset points at. ADLS-style locations get `fileSystem`, blob-style
/// ones `container`.
fn derive_store(
    dataset_name: &str,
    props: &Map<String, Value>,
    location: &mut Map<String, Value>,
    index: &TemplateIndex,
) -> Result<(), DatasetResolveError> {
    let Some(linked_name) = props
        .get("linkedServiceName")
        .and_then(|reference| reference.get("referenceName"))
        .and_then(Value::as_str)
    else {
        return Ok(());
    };
    let linked = index.linked_service(linked_name).ok_or_else(|| {
        DatasetResolveError::UnknownLinkedService {
            dataset: dataset_name.to_string(),
            linked_service: linked_name.to_string(),
        }
    })?;
    let linked_props = linked.properties.get("typeProperties");

    let derived = linked_props
        .and_then(|tp| tp.get("fileSystem").or_else(|| tp.get("container")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            linked_props
                .and_then(|tp| tp.get("url"))
                .and_then(Value::as_str)
                .and_then(store_from_url)
        });
    let Some(derived) = derived else {
        debug!(
            dataset = dataset_name,
            linked_service = linked_name,
            "linked service carries no store identifier"
        );
        return Ok(());
    };

    let slot = match location.get("type").and_then(Value::as_str) {
        Some(kind) if kind.contains("BlobFS") => "fileSystem",
        Some(kind) if kind.contains("BlobStorage") => "container",
        _ if linked_props.and_then(|tp| tp.get("fileSystem")).is_some() => "fileSystem",
        _ => "container",
    };
    location.insert(slot.to_string(), Value::String(derived));
    Ok(())
}

/// The first path segment of a storage endpoint URL, e.g.
/// `https://acct.dfs.core.windows.net/landing` → `landing`.
fn store_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let (_, path) = rest.split_once('/')?;
    let segment = path.split('/').next().unwrap_or_default();
    (!segment.is_empty()).then(|| segment.to_string())
}

//! Migration orchestration: index → globals → resolve → transform →
//! validate → output documents
//!
//! The tree transform is synchronous and pure, so cross-pipeline
//! references are pre-scanned here, resolved through the (async) pipeline
//! resolver, and handed to the transformer as a finished map. A failed
//! pipeline never aborts the run; its outcome records which activity and
//! reference failed and the remaining pipelines continue.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use refabric_core::{Pipeline, ValidationReport};
use refabric_parser::TemplateIndex;
use refabric_resolver::PipelineResolver;
use refabric_transform::{
    build_variable_library, collect_pipeline_references, extract_global_parameters,
    transform_pipeline, validate_pipeline, DeploymentBlocker, ParameterReference,
    TransformOptions, VariableLibrary,
};

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Target workspace for cross-pipeline reference resolution. Without
    /// one, references are checked against the template's own pipelines.
    pub workspace_id: Option<String>,
    pub token: String,
    pub library_name: String,
    pub library_description: String,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            workspace_id: None,
            token: String::new(),
            library_name: "MigratedGlobalParameters".into(),
            library_description: "Variable library migrated from ADF global parameters".into(),
        }
    }
}

/// Per-pipeline result. `error` is set when the pipeline failed to
/// transform; `document` and `report` are present otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn failed(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            document: None,
            report: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub generated_at: DateTime<Utc>,
    pub pipelines: Vec<PipelineOutcome>,
    pub parameter_references: Vec<ParameterReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_library: Option<VariableLibrary>,
    pub deployment_blockers: Vec<DeploymentBlocker>,
}

impl MigrationSummary {
    pub fn failed_pipelines(&self) -> impl Iterator<Item = &PipelineOutcome> {
        self.pipelines.iter().filter(|outcome| !outcome.succeeded())
    }

    pub fn has_validation_errors(&self) -> bool {
        self.pipelines
            .iter()
            .filter_map(|outcome| outcome.report.as_ref())
            .any(ValidationReport::has_errors)
    }
}

/// Run one migration over a parsed ARM template.
pub async fn run_migration(
    template: &Value,
    resolver: Option<&PipelineResolver>,
    options: &MigrationOptions,
) -> Result<MigrationSummary> {
    let index = TemplateIndex::from_json(template).context("failed to index ARM template")?;
    let counts = index.counts();
    info!(
        pipelines = counts.pipelines,
        datasets = counts.datasets,
        linked_services = counts.linked_services,
        triggers = counts.triggers,
        global_parameters = counts.global_parameters,
        "indexed template"
    );

    let parameter_references = extract_global_parameters(&index);
    let variable_library = (!parameter_references.is_empty()).then(|| {
        build_variable_library(
            &parameter_references,
            &options.library_name,
            &options.library_description,
        )
    });
    let deployment_blockers = variable_library
        .as_ref()
        .map(VariableLibrary::deployment_blockers)
        .unwrap_or_default();
    for blocker in &deployment_blockers {
        warn!(variable = %blocker.variable, "{}", blocker.reason);
    }

    let mut transform_options = TransformOptions::default();
    if let Some(library) = &variable_library {
        transform_options.rewrites = library.rewrite_map();
    }

    // Parse every pipeline up front; a malformed one becomes a failed
    // outcome, not a run abort.
    let mut parsed: Vec<(String, std::result::Result<Pipeline, String>)> = Vec::new();
    let mut referenced = BTreeSet::new();
    for component in index.pipelines() {
        match Pipeline::from_component(component) {
            Ok(pipeline) => {
                for activity in &pipeline.activities {
                    collect_pipeline_references(activity, &mut referenced);
                }
                parsed.push((component.name.clone(), Ok(pipeline)));
            }
            Err(err) => parsed.push((component.name.clone(), Err(err.to_string()))),
        }
    }

    transform_options.pipeline_ids =
        resolve_references(&referenced, &index, resolver, options).await;

    let mut outcomes = Vec::with_capacity(parsed.len());
    for (name, pipeline) in parsed {
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(error) => {
                warn!(pipeline = %name, %error, "pipeline failed to parse");
                outcomes.push(PipelineOutcome::failed(name, error));
                continue;
            }
        };
        match transform_pipeline(&pipeline, &index, &transform_options) {
            Ok((transformed, findings)) => {
                let mut report = validate_pipeline(&transformed, &pipeline);
                report.extend(findings);
                info!(pipeline = %name, findings = report.findings.len(), "pipeline migrated");
                outcomes.push(PipelineOutcome {
                    name,
                    document: Some(transformed.to_value()),
                    report: Some(report),
                    error: None,
                });
            }
            Err(err) => {
                warn!(pipeline = %name, error = %err, "pipeline failed to transform");
                outcomes.push(PipelineOutcome::failed(name, err));
            }
        }
    }

    Ok(MigrationSummary {
        generated_at: Utc::now(),
        pipelines: outcomes,
        parameter_references,
        variable_library,
        deployment_blockers,
    })
}

/// Resolve collected reference names to target ids: through the resolver
/// when a workspace is given, against the template's own pipeline set
/// otherwise. Names absent from the returned map end up deferred.
async fn resolve_references(
    referenced: &BTreeSet<String>,
    index: &TemplateIndex,
    resolver: Option<&PipelineResolver>,
    options: &MigrationOptions,
) -> BTreeMap<String, Option<String>> {
    let mut pipeline_ids = BTreeMap::new();
    match (&options.workspace_id, resolver) {
        (Some(workspace_id), Some(resolver)) => {
            for name in referenced {
                if let Some(id) = resolver
                    .resolve_pipeline_reference(name, workspace_id, &options.token)
                    .await
                {
                    pipeline_ids.insert(name.clone(), Some(id));
                }
            }
        }
        _ => {
            for name in referenced {
                if index.pipeline(name).is_some() {
                    pipeline_ids.insert(name.clone(), None);
                }
            }
        }
    }
    pipeline_ids
}

/// Write the migrated documents, the summary, and (when deployable) the
/// variable library under `out_dir`.
pub fn write_outputs(
    summary: &MigrationSummary,
    out_dir: &Path,
    allow_placeholders: bool,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;

    for outcome in &summary.pipelines {
        if let Some(document) = &outcome.document {
            let path = out_dir.join(format!("{}.pipeline.json", outcome.name));
            fs::write(&path, serde_json::to_string_pretty(document)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }
    fs::write(
        out_dir.join("migration-summary.json"),
        serde_json::to_string_pretty(summary)?,
    )
    .context("failed to write migration summary")?;

    if let Some(library) = &summary.variable_library {
        if !summary.deployment_blockers.is_empty() && !allow_placeholders {
            bail!(
                "variable library has {} deployment blocker(s); set real values for the placeholder secrets or pass --allow-placeholders",
                summary.deployment_blockers.len()
            );
        }
        fs::write(
            out_dir.join("variable-library.json"),
            serde_json::to_string_pretty(library)?,
        )
        .context("failed to write variable library")?;
    }
    Ok(())
}

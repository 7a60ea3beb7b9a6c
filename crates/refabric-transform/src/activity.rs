//! The activity tree transformer
//!
//! One recursive-descent function dispatches on the activity's tagged
//! union and rewrites each node into the shape Fabric expects. The
//! traversal is pre-order, depth-first, left-to-right, which makes
//! diagnostics deterministic; siblings are independent. The transform is
//! copy-on-write: the input tree is never mutated, so the same source can
//! be transformed repeatedly (dry run, then real run) without
//! contamination.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use refabric_core::activity::{
    Activity, ActivityBody, CopyActivity, ExecutePipelineActivity, SwitchCase,
};
use refabric_core::{Pipeline, ValidationFinding};
use refabric_parser::TemplateIndex;

use crate::dataset::resolve_dataset;
use crate::error::TransformError;
use crate::expression::rewrite_value;

/// Marker left on an ExecutePipeline activity whose target could not be
/// resolved in the target workspace.
pub const DEFERRED_REFERENCE_KEY: &str = "deferredPipelineReference";

const ORIGINAL_INPUTS_KEY: &str = "_originalInputs";
const ORIGINAL_OUTPUTS_KEY: &str = "_originalOutputs";

/// Per-run inputs to the transformer.
///
/// Pipeline references are pre-resolved by the orchestrator (the resolver
/// performs I/O; the transform does not): `Some(id)` is a resolved target
/// pipeline, `None` a pipeline known to exist but without a target id
/// (offline mode). Names absent from the map are deferred.
#[derive(Debug, Default)]
pub struct TransformOptions {
    pub pipeline_ids: BTreeMap<String, Option<String>>,
    /// Global parameter name → replacement expression path.
    pub rewrites: BTreeMap<String, String>,
}

/// Findings accumulated while transforming one pipeline: skipped shapes,
/// deferred references, expressions passed through unrecognized.
#[derive(Debug)]
pub struct TransformContext {
    pub pipeline: String,
    pub findings: Vec<ValidationFinding>,
}

impl TransformContext {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            findings: Vec::new(),
        }
    }
}

/// Transform every top-level activity of a pipeline.
///
/// An unresolved dataset reference aborts this pipeline; unsupported
/// activity shapes are reported and skipped while siblings continue.
pub fn transform_pipeline(
    pipeline: &Pipeline,
    index: &TemplateIndex,
    options: &TransformOptions,
) -> Result<(Pipeline, Vec<ValidationFinding>), TransformError> {
    let mut ctx = TransformContext::new(&pipeline.name);
    let activities = transform_children(&pipeline.activities, index, options, &mut ctx)?;
    let mut transformed = pipeline.clone();
    transformed.activities = activities;
    Ok((transformed, ctx.findings))
}

/// Transform one activity node. `Ok(None)` means the activity had an
/// unsupported shape: the finding is recorded and the node is omitted.
pub fn transform_activity(
    activity: &Activity,
    index: &TemplateIndex,
    options: &TransformOptions,
    ctx: &mut TransformContext,
) -> Result<Option<Activity>, TransformError> {
    debug!(pipeline = %ctx.pipeline, activity = %activity.name, kind = activity.kind(), "transforming activity");

    let body = match &activity.body {
        ActivityBody::Copy(copy) => {
            match transform_copy(&activity.name, copy, index, options, ctx)? {
                Some(copy) => ActivityBody::Copy(copy),
                None => return Ok(None),
            }
        }
        ActivityBody::ExecutePipeline(execute) => {
            ActivityBody::ExecutePipeline(transform_execute_pipeline(
                &activity.name,
                execute,
                options,
                ctx,
            ))
        }
        ActivityBody::ForEach(for_each) => {
            let mut transformed = for_each.clone();
            transformed.type_properties_extra =
                rewrite_map(&for_each.type_properties_extra, options);
            transformed.activities =
                transform_children(&for_each.activities, index, options, ctx)?;
            ActivityBody::ForEach(transformed)
        }
        ActivityBody::Until(until) => {
            let mut transformed = until.clone();
            transformed.type_properties_extra = rewrite_map(&until.type_properties_extra, options);
            transformed.activities = transform_children(&until.activities, index, options, ctx)?;
            ActivityBody::Until(transformed)
        }
        ActivityBody::IfCondition(if_condition) => {
            let mut transformed = if_condition.clone();
            transformed.type_properties_extra =
                rewrite_map(&if_condition.type_properties_extra, options);
            // An absent branch stays absent; only present lists recurse.
            transformed.if_true_activities = if_condition
                .if_true_activities
                .as_ref()
                .map(|list| transform_children(list, index, options, ctx))
                .transpose()?;
            transformed.if_false_activities = if_condition
                .if_false_activities
                .as_ref()
                .map(|list| transform_children(list, index, options, ctx))
                .transpose()?;
            ActivityBody::IfCondition(transformed)
        }
        ActivityBody::Switch(switch) => {
            let mut transformed = switch.clone();
            transformed.type_properties_extra = rewrite_map(&switch.type_properties_extra, options);
            transformed.cases = switch
                .cases
                .iter()
                .map(|case| {
                    Ok(SwitchCase {
                        activities: transform_children(&case.activities, index, options, ctx)?,
                        extra: rewrite_map(&case.extra, options),
                    })
                })
                .collect::<Result<Vec<_>, TransformError>>()?;
            transformed.default_activities = switch
                .default_activities
                .as_ref()
                .map(|list| transform_children(list, index, options, ctx))
                .transpose()?;
            ActivityBody::Switch(transformed)
        }
        ActivityBody::Other(other) => {
            let mut transformed = other.clone();
            transformed.type_properties = other
                .type_properties
                .as_ref()
                .map(|tp| rewrite_value(tp, &options.rewrites));
            ActivityBody::Other(transformed)
        }
    };

    let mut transformed = activity.clone();
    transformed.body = body;
    if matches!(transformed.body, ActivityBody::Copy(_)) {
        transformed.extra.remove(ORIGINAL_INPUTS_KEY);
        transformed.extra.remove(ORIGINAL_OUTPUTS_KEY);
    }
    Ok(Some(transformed))
}

fn transform_children(
    children: &[Activity],
    index: &TemplateIndex,
    options: &TransformOptions,
    ctx: &mut TransformContext,
) -> Result<Vec<Activity>, TransformError> {
    let mut transformed = Vec::with_capacity(children.len());
    for child in children {
        if let Some(child) = transform_activity(child, index, options, ctx)? {
            transformed.push(child);
        }
    }
    Ok(transformed)
}

fn transform_copy(
    activity: &str,
    copy: &CopyActivity,
    index: &TemplateIndex,
    options: &TransformOptions,
    ctx: &mut TransformContext,
) -> Result<Option<CopyActivity>, TransformError> {
    let has_source_settings = side_has_settings(&copy.source);
    let has_sink_settings = side_has_settings(&copy.sink);

    // Already transformed: nothing to resolve, nothing to remove.
    if copy.inputs.is_none() && copy.outputs.is_none() && has_source_settings && has_sink_settings {
        debug!(%activity, "copy activity already carries dataset settings");
        return Ok(Some(rewritten_copy(copy, options)));
    }

    let inputs = copy.inputs.as_deref().unwrap_or_default();
    let outputs = copy.outputs.as_deref().unwrap_or_default();
    if inputs.len() > 1 || outputs.len() > 1 {
        skip_unsupported(
            activity,
            format!(
                "copy activities support exactly one input and one output dataset reference, found {} and {}",
                inputs.len(),
                outputs.len()
            ),
            ctx,
        );
        return Ok(None);
    }
    let (Some(input), Some(output)) = (inputs.first(), outputs.first()) else {
        skip_unsupported(
            activity,
            "copy activity has no input or output dataset reference to inline",
            ctx,
        );
        return Ok(None);
    };

    let resolved_source = resolve_dataset(input, index)
        .map_err(|source| TransformError::unresolved(activity, source))?;
    let resolved_sink = resolve_dataset(output, index)
        .map_err(|source| TransformError::unresolved(activity, source))?;
    for diagnostic in resolved_source
        .diagnostics
        .iter()
        .chain(&resolved_sink.diagnostics)
    {
        ctx.findings
            .push(ValidationFinding::warning(diagnostic.clone()).for_activity(activity));
    }

    let mut transformed = rewritten_copy(copy, options);
    transformed.source = Some(with_settings(
        transformed.source.take(),
        resolved_source.settings.to_value(),
    ));
    transformed.sink = Some(with_settings(
        transformed.sink.take(),
        resolved_sink.settings.to_value(),
    ));
    transformed.inputs = None;
    transformed.outputs = None;
    Ok(Some(transformed))
}

fn rewritten_copy(copy: &CopyActivity, options: &TransformOptions) -> CopyActivity {
    let mut rewritten = copy.clone();
    rewritten.source = copy
        .source
        .as_ref()
        .map(|side| rewrite_value(side, &options.rewrites));
    rewritten.sink = copy
        .sink
        .as_ref()
        .map(|side| rewrite_value(side, &options.rewrites));
    rewritten.type_properties_extra = rewrite_map(&copy.type_properties_extra, options);
    rewritten
}

fn side_has_settings(side: &Option<Value>) -> bool {
    side.as_ref()
        .and_then(|side| side.get("datasetSettings"))
        .is_some()
}

fn with_settings(side: Option<Value>, settings: Value) -> Value {
    let mut side = match side {
        Some(Value::Object(side)) => side,
        _ => Map::new(),
    };
    side.insert("datasetSettings".into(), settings);
    Value::Object(side)
}

fn skip_unsupported(activity: &str, reason: impl Into<String>, ctx: &mut TransformContext) {
    let reason = reason.into();
    warn!(pipeline = %ctx.pipeline, %activity, %reason, "skipping activity with unsupported shape");
    ctx.findings.push(
        ValidationFinding::error(format!("unsupported activity shape: {reason}"))
            .for_activity(activity),
    );
}

fn transform_execute_pipeline(
    activity: &str,
    execute: &ExecutePipelineActivity,
    options: &TransformOptions,
    ctx: &mut TransformContext,
) -> ExecutePipelineActivity {
    let rewritten = rewrite_value(&Value::Object(execute.type_properties.clone()), &options.rewrites);
    let mut type_properties = match rewritten {
        Value::Object(map) => map,
        _ => execute.type_properties.clone(),
    };

    // A previously resolved reference keeps its id; re-transforming must
    // not demote it to deferred.
    if type_properties.contains_key("pipelineId") {
        type_properties.remove(DEFERRED_REFERENCE_KEY);
        return ExecutePipelineActivity { type_properties };
    }

    match execute.referenced_pipeline_name() {
        None => {
            ctx.findings.push(
                ValidationFinding::warning("ExecutePipeline activity has no pipeline reference")
                    .for_activity(activity),
            );
        }
        Some(reference) => match options.pipeline_ids.get(reference) {
            Some(Some(id)) => {
                type_properties.insert("pipelineId".into(), Value::String(id.clone()));
                type_properties.remove(DEFERRED_REFERENCE_KEY);
            }
            Some(None) => {
                // Known pipeline without a target id (offline mode); the
                // reference stays as-is.
            }
            None => {
                warn!(%activity, %reference, "pipeline reference not found; deferring");
                type_properties.insert(DEFERRED_REFERENCE_KEY.into(), Value::Bool(true));
                ctx.findings.push(
                    ValidationFinding::warning(format!(
                        "referenced pipeline `{reference}` was not found in the target workspace; reference deferred"
                    ))
                    .for_activity(activity),
                );
            }
        },
    }
    ExecutePipelineActivity { type_properties }
}

fn rewrite_map(map: &Map<String, Value>, options: &TransformOptions) -> Map<String, Value> {
    if options.rewrites.is_empty() {
        return map.clone();
    }
    map.iter()
        .map(|(key, value)| (key.clone(), rewrite_value(value, &options.rewrites)))
        .collect()
}

/// Collect the pipeline names referenced by ExecutePipeline activities
/// anywhere in the tree, for pre-resolution by the orchestrator.
pub fn collect_pipeline_references(activity: &Activity, found: &mut BTreeSet<String>) {
    match &activity.body {
        ActivityBody::ExecutePipeline(execute) => {
            if execute.type_properties.contains_key("pipelineId") {
                return;
            }
            if let Some(name) = execute.referenced_pipeline_name() {
                if !name.is_empty() {
                    found.insert(name.to_string());
                }
            }
        }
        ActivityBody::ForEach(for_each) => {
            for child in &for_each.activities {
                collect_pipeline_references(child, found);
            }
        }
        ActivityBody::Until(until) => {
            for child in &until.activities {
                collect_pipeline_references(child, found);
            }
        }
        ActivityBody::IfCondition(if_condition) => {
            for child in if_condition
                .if_true_activities
                .iter()
                .chain(&if_condition.if_false_activities)
                .flatten()
            {
                collect_pipeline_references(child, found);
            }
        }
        ActivityBody::Switch(switch) => {
            for child in switch
                .cases
                .iter()
                .flat_map(|case| &case.activities)
                .chain(switch.default_activities.iter().flatten())
            {
                collect_pipeline_references(child, found);
            }
        }
        ActivityBody::Copy(_) | ActivityBody::Other(_) => {}
    }
}

//! Post-transform validation
//!
//! Walks the transformed and original trees in lock-step (the same
//! recursive descent as the transformer) and checks the structural
//! invariants a mis-transformed pipeline would violate at runtime. The
//! validator never fails; it accumulates findings and leaves pass/fail
//! policy to the caller.

use serde_json::Value;

use refabric_core::activity::{Activity, ActivityBody, CopyActivity, IfConditionActivity};
use refabric_core::{Pipeline, ValidationFinding, ValidationReport};

use crate::activity::DEFERRED_REFERENCE_KEY;

const LEGACY_MARKERS: [&str; 2] = ["_originalInputs", "_originalOutputs"];

/// Validate one transformed pipeline against its source.
pub fn validate_pipeline(transformed: &Pipeline, original: &Pipeline) -> ValidationReport {
    let mut report = ValidationReport::new(&original.name);
    validate_lists(Some(&transformed.activities), &original.activities, &mut report);
    report
}

fn validate_lists(
    transformed: Option<&[Activity]>,
    original: &[Activity],
    report: &mut ValidationReport,
) {
    let transformed = transformed.unwrap_or_default();
    for source in original {
        let counterpart = transformed.iter().find(|a| a.name == source.name);
        validate_activity(counterpart, source, report);
    }
}

fn validate_activity(
    transformed: Option<&Activity>,
    original: &Activity,
    report: &mut ValidationReport,
) {
    let Some(transformed) = transformed else {
        report.push(
            ValidationFinding::warning("activity was skipped during transformation")
                .for_activity(&original.name),
        );
        return;
    };

    match (&transformed.body, &original.body) {
        (ActivityBody::Copy(after), ActivityBody::Copy(before)) => {
            validate_copy(transformed, after, before, report);
        }
        (ActivityBody::ExecutePipeline(after), ActivityBody::ExecutePipeline(_)) => {
            if after.type_properties.get(DEFERRED_REFERENCE_KEY) == Some(&Value::Bool(true)) {
                report.push(
                    ValidationFinding::warning(
                        "pipeline reference is deferred; the target pipeline must exist before this activity can run",
                    )
                    .for_activity(&transformed.name),
                );
            }
        }
        (ActivityBody::ForEach(after), ActivityBody::ForEach(before)) => {
            validate_lists(Some(&after.activities), &before.activities, report);
        }
        (ActivityBody::Until(after), ActivityBody::Until(before)) => {
            validate_lists(Some(&after.activities), &before.activities, report);
        }
        (ActivityBody::IfCondition(after), ActivityBody::IfCondition(before)) => {
            validate_branch(
                transformed,
                "ifTrueActivities",
                after,
                before,
                |body| body.if_true_activities.as_deref(),
                report,
            );
            validate_branch(
                transformed,
                "ifFalseActivities",
                after,
                before,
                |body| body.if_false_activities.as_deref(),
                report,
            );
        }
        (ActivityBody::Switch(after), ActivityBody::Switch(before)) => {
            for (index, case) in before.cases.iter().enumerate() {
                let counterpart = after.cases.get(index).map(|c| c.activities.as_slice());
                validate_lists(counterpart, &case.activities, report);
            }
            if let Some(default) = &before.default_activities {
                validate_lists(after.default_activities.as_deref(), default, report);
            }
        }
        (ActivityBody::Other(_), ActivityBody::Other(_)) => {}
        (after, before) => {
            if kind_of(after) != kind_of(before) {
                report.push(
                    ValidationFinding::error(format!(
                        "activity type changed from `{}` to `{}` during transformation",
                        kind_of(before),
                        kind_of(after)
                    ))
                    .for_activity(&transformed.name),
                );
            }
        }
    }
}

fn kind_of(body: &ActivityBody) -> &str {
    match body {
        ActivityBody::Copy(_) => "Copy",
        ActivityBody::ExecutePipeline(_) => "ExecutePipeline",
        ActivityBody::ForEach(_) => "ForEach",
        ActivityBody::IfCondition(_) => "IfCondition",
        ActivityBody::Switch(_) => "Switch",
        ActivityBody::Until(_) => "Until",
        ActivityBody::Other(other) => &other.kind,
    }
}

fn validate_branch(
    activity: &Activity,
    branch: &str,
    after: &IfConditionActivity,
    before: &IfConditionActivity,
    select: fn(&IfConditionActivity) -> Option<&[Activity]>,
    report: &mut ValidationReport,
) {
    match (select(after), select(before)) {
        (Some(transformed), Some(original)) => {
            validate_lists(Some(transformed), original, report);
        }
        (None, Some(original)) => {
            report.push(
                ValidationFinding::error(format!(
                    "`{branch}` was lost during transformation ({} activities)",
                    original.len()
                ))
                .for_activity(&activity.name),
            );
        }
        (Some(_), None) => {
            report.push(
                ValidationFinding::error(format!(
                    "`{branch}` was absent in the source but present after transformation"
                ))
                .for_activity(&activity.name),
            );
        }
        (None, None) => {}
    }
}

fn validate_copy(
    activity: &Activity,
    after: &CopyActivity,
    before: &CopyActivity,
    report: &mut ValidationReport,
) {
    for marker in LEGACY_MARKERS {
        if activity.extra.contains_key(marker) {
            report.push(
                ValidationFinding::error(format!("legacy marker `{marker}` is still present"))
                    .for_activity(&activity.name),
            );
        }
    }
    if after.inputs.is_some() {
        report.push(
            ValidationFinding::error("`inputs` still present after transformation")
                .for_activity(&activity.name),
        );
    }
    if after.outputs.is_some() {
        report.push(
            ValidationFinding::error("`outputs` still present after transformation")
                .for_activity(&activity.name),
        );
    }

    validate_copy_side(activity, "source", &after.source, &before.source, report);
    validate_copy_side(activity, "sink", &after.sink, &before.sink, report);
}

fn validate_copy_side(
    activity: &Activity,
    side: &str,
    after: &Option<Value>,
    before: &Option<Value>,
    report: &mut ValidationReport,
) {
    let settings = after.as_ref().and_then(|value| value.get("datasetSettings"));
    let Some(settings) = settings else {
        report.push(
            ValidationFinding::error(format!("`{side}.datasetSettings` is missing"))
                .for_activity(&activity.name),
        );
        return;
    };

    // Historically observed defect class: a wildcard path whose resolved
    // location lost its store identifier fails silently at runtime.
    if wildcard_declared(before) && resolved_store(settings).is_none() {
        report.push(
            ValidationFinding::error(format!(
                "`{side}` store settings declare a wildcard path but the resolved location has no `fileSystem` or `container`"
            ))
            .for_activity(&activity.name),
        );
    }
}

fn wildcard_declared(side: &Option<Value>) -> bool {
    side.as_ref()
        .and_then(|value| value.get("storeSettings"))
        .map(|store| {
            store.get("wildcardFolderPath").is_some() || store.get("wildcardFileName").is_some()
        })
        .unwrap_or(false)
}

fn resolved_store(settings: &Value) -> Option<&str> {
    let location = settings.get("typeProperties")?.get("location")?;
    location
        .get("fileSystem")
        .or_else(|| location.get("container"))
        .and_then(Value::as_str)
        .filter(|identifier| !identifier.is_empty())
}

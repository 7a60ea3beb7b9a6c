//! End-to-end transformation tests over realistic template fixtures

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use refabric_core::activity::{Activity, ActivityBody};
use refabric_core::Pipeline;
use refabric_parser::TemplateIndex;
use refabric_transform::{
    collect_pipeline_references, transform_pipeline, validate_pipeline, TransformError,
    TransformOptions,
};

fn fixture_template(pipeline_properties: Value) -> Value {
    json!({
        "resources": [
            {
                "name": "f/IngestOrders",
                "type": "Microsoft.DataFactory/factories/pipelines",
                "properties": pipeline_properties
            },
            {
                "name": "f/AzureSqlTable1",
                "type": "Microsoft.DataFactory/factories/datasets",
                "properties": {
                    "type": "AzureSqlTable",
                    "linkedServiceName": { "referenceName": "Sql", "type": "LinkedServiceReference" },
                    "typeProperties": { "tableName": "dbo.Orders" }
                }
            },
            {
                "name": "f/Parquet1",
                "type": "Microsoft.DataFactory/factories/datasets",
                "properties": {
                    "type": "Parquet",
                    "linkedServiceName": { "referenceName": "Lake", "type": "LinkedServiceReference" },
                    "parameters": {
                        "p_Directory": { "type": "String" },
                        "p_FileName": { "type": "String" }
                    },
                    "typeProperties": {
                        "location": {
                            "type": "AzureBlobFSLocation",
                            "folderPath": "@dataset().p_Directory",
                            "fileName": "@dataset().p_FileName"
                        }
                    }
                }
            },
            {
                "name": "f/Sql",
                "type": "Microsoft.DataFactory/factories/linkedServices",
                "properties": { "type": "AzureSqlDatabase", "typeProperties": {} }
            },
            {
                "name": "f/Lake",
                "type": "Microsoft.DataFactory/factories/linkedServices",
                "properties": {
                    "type": "AzureBlobFS",
                    "typeProperties": { "url": "https://acct.dfs.core.windows.net/landing" }
                }
            }
        ]
    })
}

fn copy_activity(name: &str) -> Value {
    json!({
        "name": name,
        "type": "Copy",
        "inputs": [{ "referenceName": "AzureSqlTable1", "type": "DatasetReference" }],
        "outputs": [{
            "referenceName": "Parquet1",
            "type": "DatasetReference",
            "parameters": { "p_Directory": "migration", "p_FileName": "grocery.parquet" }
        }],
        "typeProperties": {
            "source": { "type": "AzureSqlSource" },
            "sink": {
                "type": "ParquetSink",
                "storeSettings": { "type": "AzureBlobFSWriteSettings" }
            }
        }
    })
}

fn transform_fixture(
    pipeline_properties: Value,
) -> Result<(Pipeline, Pipeline, Vec<refabric_core::ValidationFinding>), TransformError> {
    let template = fixture_template(pipeline_properties);
    let index = TemplateIndex::from_json(&template).unwrap();
    let original = Pipeline::from_component(index.pipeline("IngestOrders").unwrap()).unwrap();
    let (transformed, findings) =
        transform_pipeline(&original, &index, &TransformOptions::default())?;
    Ok((transformed, original, findings))
}

/// Every Copy activity in a transformed tree, at any depth.
fn copy_activities(activities: &[Activity], out: &mut Vec<Activity>) {
    for activity in activities {
        match &activity.body {
            ActivityBody::Copy(_) => out.push(activity.clone()),
            ActivityBody::ForEach(f) => copy_activities(&f.activities, out),
            ActivityBody::Until(u) => copy_activities(&u.activities, out),
            ActivityBody::IfCondition(i) => {
                for list in i.if_true_activities.iter().chain(&i.if_false_activities) {
                    copy_activities(list, out);
                }
            }
            ActivityBody::Switch(s) => {
                for case in &s.cases {
                    copy_activities(&case.activities, out);
                }
                if let Some(default) = &s.default_activities {
                    copy_activities(default, out);
                }
            }
            _ => {}
        }
    }
}

#[test]
fn copy_scenario_inlines_dataset_settings() {
    let (transformed, original, findings) = transform_fixture(json!({
        "activities": [copy_activity("CopyOrders")]
    }))
    .unwrap();
    assert!(findings.is_empty());

    let document = transformed.to_value();
    let activity = &document["properties"]["activities"][0];
    assert!(activity.get("inputs").is_none());
    assert!(activity.get("outputs").is_none());

    let sink_location = &activity["typeProperties"]["sink"]["datasetSettings"]["typeProperties"]["location"];
    assert_eq!(sink_location["folderPath"], json!("migration"));
    assert_eq!(sink_location["fileName"], json!("grocery.parquet"));
    assert_eq!(sink_location["fileSystem"], json!("landing"));

    let report = validate_pipeline(&transformed, &original);
    assert!(!report.has_errors(), "unexpected errors: {report}");
}

#[test]
fn no_leakage_at_any_nesting_depth() {
    let nested = json!({
        "activities": [{
            "name": "LoopFiles",
            "type": "ForEach",
            "typeProperties": {
                "items": { "value": "@pipeline().parameters.files", "type": "Expression" },
                "activities": [{
                    "name": "MaybeCopy",
                    "type": "IfCondition",
                    "typeProperties": {
                        "expression": { "value": "@greater(item().size, 0)", "type": "Expression" },
                        "ifTrueActivities": [copy_activity("DeepCopy")]
                    }
                }]
            }
        }]
    });
    let (transformed, original, _) = transform_fixture(nested).unwrap();

    let mut copies = Vec::new();
    copy_activities(&transformed.activities, &mut copies);
    assert_eq!(copies.len(), 1);
    for copy in &copies {
        let value = copy.to_value();
        assert!(value.get("inputs").is_none());
        assert!(value.get("outputs").is_none());
        assert!(value.get("_originalInputs").is_none());
        assert!(value.get("_originalOutputs").is_none());
    }

    let report = validate_pipeline(&transformed, &original);
    assert!(!report.has_errors(), "unexpected errors: {report}");
}

#[test]
fn transform_is_idempotent() {
    let (first, _, _) = transform_fixture(json!({
        "activities": [copy_activity("CopyOrders")]
    }))
    .unwrap();

    let template = fixture_template(json!({ "activities": [] }));
    let index = TemplateIndex::from_json(&template).unwrap();
    let (second, findings) =
        transform_pipeline(&first, &index, &TransformOptions::default()).unwrap();
    assert!(findings.is_empty());
    assert_eq!(second, first);
}

#[test]
fn legacy_markers_are_removed() {
    let mut activity = copy_activity("CopyOrders");
    activity["_originalInputs"] = json!([{ "referenceName": "AzureSqlTable1" }]);
    activity["_originalOutputs"] = json!([{ "referenceName": "Parquet1" }]);
    let (transformed, original, _) =
        transform_fixture(json!({ "activities": [activity] })).unwrap();

    let value = transformed.activities[0].to_value();
    assert!(value.get("_originalInputs").is_none());
    assert!(value.get("_originalOutputs").is_none());

    let report = validate_pipeline(&transformed, &original);
    assert!(!report.has_errors(), "unexpected errors: {report}");
}

#[test]
fn unresolved_dataset_aborts_the_pipeline_with_context() {
    let mut activity = copy_activity("CopyOrders");
    activity["inputs"][0]["referenceName"] = json!("Vanished");
    let err = transform_fixture(json!({ "activities": [activity] })).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("CopyOrders"), "got: {message}");
    assert!(message.contains("Vanished"), "got: {message}");
}

#[test]
fn multi_dataset_copy_is_skipped_but_siblings_transform() {
    let mut bad = copy_activity("BadCopy");
    bad["inputs"] = json!([
        { "referenceName": "AzureSqlTable1", "type": "DatasetReference" },
        { "referenceName": "Parquet1", "type": "DatasetReference" }
    ]);
    let (transformed, original, findings) = transform_fixture(json!({
        "activities": [bad, copy_activity("GoodCopy")]
    }))
    .unwrap();

    assert_eq!(transformed.activities.len(), 1);
    assert_eq!(transformed.activities[0].name, "GoodCopy");
    assert!(findings
        .iter()
        .any(|f| f.activity.as_deref() == Some("BadCopy")));

    let report = validate_pipeline(&transformed, &original);
    assert!(report
        .warnings()
        .any(|f| f.activity.as_deref() == Some("BadCopy")));
}

#[test]
fn wildcard_without_store_is_a_validation_error() {
    // A dataset on a linked service that yields no store identifier,
    // with wildcard store settings on the copy source.
    let template = json!({
        "resources": [
            {
                "name": "f/P",
                "type": "Microsoft.DataFactory/factories/pipelines",
                "properties": {
                    "activities": [{
                        "name": "WildCopy",
                        "type": "Copy",
                        "inputs": [{ "referenceName": "Csv", "type": "DatasetReference" }],
                        "outputs": [{ "referenceName": "Csv", "type": "DatasetReference" }],
                        "typeProperties": {
                            "source": {
                                "type": "DelimitedTextSource",
                                "storeSettings": {
                                    "type": "AzureBlobFSReadSettings",
                                    "wildcardFolderPath": "in/*",
                                    "wildcardFileName": "*.csv"
                                }
                            },
                            "sink": { "type": "DelimitedTextSink" }
                        }
                    }]
                }
            },
            {
                "name": "f/Csv",
                "type": "Microsoft.DataFactory/factories/datasets",
                "properties": {
                    "type": "DelimitedText",
                    "linkedServiceName": { "referenceName": "Bare" },
                    "typeProperties": {
                        "location": { "type": "AzureBlobFSLocation", "folderPath": "in" }
                    }
                }
            },
            {
                "name": "f/Bare",
                "type": "Microsoft.DataFactory/factories/linkedServices",
                "properties": { "type": "AzureBlobFS", "typeProperties": {} }
            }
        ]
    });
    let index = TemplateIndex::from_json(&template).unwrap();
    let original = Pipeline::from_component(index.pipeline("P").unwrap()).unwrap();
    let (transformed, _) =
        transform_pipeline(&original, &index, &TransformOptions::default()).unwrap();

    let report = validate_pipeline(&transformed, &original);
    assert!(report.has_errors());
    assert!(report
        .errors()
        .any(|f| f.activity.as_deref() == Some("WildCopy") && f.message.contains("wildcard")));
}

#[test]
fn execute_pipeline_resolution_and_deferral() {
    let properties = json!({
        "activities": [
            {
                "name": "CallKnown",
                "type": "ExecutePipeline",
                "typeProperties": {
                    "pipeline": { "referenceName": "Downstream", "type": "PipelineReference" },
                    "waitOnCompletion": true
                }
            },
            {
                "name": "CallMissing",
                "type": "ExecutePipeline",
                "typeProperties": {
                    "pipeline": { "referenceName": "Gone", "type": "PipelineReference" }
                }
            }
        ]
    });
    let template = fixture_template(properties);
    let index = TemplateIndex::from_json(&template).unwrap();
    let original = Pipeline::from_component(index.pipeline("IngestOrders").unwrap()).unwrap();

    let mut names = BTreeSet::new();
    for activity in &original.activities {
        collect_pipeline_references(activity, &mut names);
    }
    assert_eq!(
        names.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["Downstream", "Gone"]
    );

    let mut options = TransformOptions::default();
    options
        .pipeline_ids
        .insert("Downstream".into(), Some("11111111-2222-3333-4444-555555555555".into()));
    let (transformed, findings) = transform_pipeline(&original, &index, &options).unwrap();

    let known = transformed.activity("CallKnown").unwrap().to_value();
    assert_eq!(
        known["typeProperties"]["pipelineId"],
        json!("11111111-2222-3333-4444-555555555555")
    );
    assert!(known["typeProperties"].get("deferredPipelineReference").is_none());

    let missing = transformed.activity("CallMissing").unwrap().to_value();
    assert_eq!(missing["typeProperties"]["deferredPipelineReference"], json!(true));
    assert!(findings
        .iter()
        .any(|f| f.activity.as_deref() == Some("CallMissing")));

    let report = validate_pipeline(&transformed, &original);
    assert!(!report.has_errors());
    assert!(report
        .warnings()
        .any(|f| f.activity.as_deref() == Some("CallMissing")));
}

#[test]
fn global_parameter_rewrite_reaches_nested_activities() {
    let properties = json!({
        "activities": [{
            "name": "Loop",
            "type": "ForEach",
            "typeProperties": {
                "items": { "value": "@pipeline().globalParameters.gp_Items", "type": "Expression" },
                "activities": [{
                    "name": "Call",
                    "type": "WebActivity",
                    "typeProperties": {
                        "url": "@pipeline().globalParameters.gp_BaseUrl",
                        "method": "GET"
                    }
                }]
            }
        }]
    });
    let template = fixture_template(properties);
    let index = TemplateIndex::from_json(&template).unwrap();
    let original = Pipeline::from_component(index.pipeline("IngestOrders").unwrap()).unwrap();

    let mut options = TransformOptions::default();
    for name in ["gp_Items", "gp_BaseUrl"] {
        options.rewrites.insert(
            name.into(),
            format!("pipeline().libraryVariables.Migrated.{name}"),
        );
    }
    let (transformed, _) = transform_pipeline(&original, &index, &options).unwrap();
    let document = transformed.to_value();
    let loop_tp = &document["properties"]["activities"][0]["typeProperties"];
    assert_eq!(
        loop_tp["items"]["value"],
        json!("@pipeline().libraryVariables.Migrated.gp_Items")
    );
    assert_eq!(
        loop_tp["activities"][0]["typeProperties"]["url"],
        json!("@pipeline().libraryVariables.Migrated.gp_BaseUrl")
    );
}

#[test]
fn absent_branch_survives_transformation_absent() {
    let properties = json!({
        "activities": [{
            "name": "Branch",
            "type": "IfCondition",
            "typeProperties": {
                "expression": { "value": "@true", "type": "Expression" },
                "ifTrueActivities": [copy_activity("ThenCopy")]
            }
        }]
    });
    let (transformed, original, _) = transform_fixture(properties).unwrap();
    let value = transformed.activities[0].to_value();
    assert!(value["typeProperties"].get("ifTrueActivities").is_some());
    assert!(value["typeProperties"].get("ifFalseActivities").is_none());

    let report = validate_pipeline(&transformed, &original);
    assert!(!report.has_errors(), "unexpected errors: {report}");
}

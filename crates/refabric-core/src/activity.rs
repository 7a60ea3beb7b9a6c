//! The recursively nested activity grammar
//!
//! Activities form a tree: container activities (ForEach, IfCondition,
//! Switch, Until) hold lists of child activities, each of which may itself
//! be a container. The grammar is modeled as a tagged union with explicit
//! JSON conversion that is loss-free for every field the engine does not
//! interpret, so a tree can be parsed, transformed copy-on-write, and
//! serialized without contaminating the source document.
//!
//! Cross-references (`dependsOn`, dataset and pipeline references) are by
//! name only, never by pointer.

use crate::dataset::DatasetReference;
use crate::error::CoreError;
use serde_json::{Map, Value};

/// One step in a pipeline's control flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub name: String,
    /// Same-scope ordering edges referencing sibling activity names,
    /// preserved verbatim.
    pub depends_on: Vec<Value>,
    pub policy: Option<Value>,
    pub user_properties: Option<Value>,
    pub body: ActivityBody,
    /// Top-level fields the engine does not interpret (description,
    /// state, legacy markers, ...), preserved verbatim.
    pub extra: Map<String, Value>,
}

/// Variant payload of an activity, discriminated by the ADF `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityBody {
    Copy(CopyActivity),
    ExecutePipeline(ExecutePipelineActivity),
    ForEach(ForEachActivity),
    IfCondition(IfConditionActivity),
    Switch(SwitchActivity),
    Until(UntilActivity),
    /// Any activity type outside the transformed subset; passed through
    /// unchanged except for expression rewrites.
    Other(OtherActivity),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CopyActivity {
    pub source: Option<Value>,
    pub sink: Option<Value>,
    /// Remaining `typeProperties` keys (translator, enableStaging, ...).
    pub type_properties_extra: Map<String, Value>,
    /// Legacy activity-level dataset reference arrays. Removed by the
    /// transformer once their content is inlined.
    pub inputs: Option<Vec<DatasetReference>>,
    pub outputs: Option<Vec<DatasetReference>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutePipelineActivity {
    pub type_properties: Map<String, Value>,
}

impl ExecutePipelineActivity {
    /// The display name of the referenced pipeline, if the reference is
    /// well-formed.
    pub fn referenced_pipeline_name(&self) -> Option<&str> {
        self.type_properties
            .get("pipeline")?
            .get("referenceName")?
            .as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForEachActivity {
    pub activities: Vec<Activity>,
    pub type_properties_extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IfConditionActivity {
    /// `None` when the source omitted the branch; an absent branch must
    /// stay absent through transformation.
    pub if_true_activities: Option<Vec<Activity>>,
    pub if_false_activities: Option<Vec<Activity>>,
    pub type_properties_extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SwitchActivity {
    pub cases: Vec<SwitchCase>,
    pub default_activities: Option<Vec<Activity>>,
    pub type_properties_extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SwitchCase {
    pub activities: Vec<Activity>,
    /// The case `value` and any other keys, preserved verbatim.
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UntilActivity {
    pub activities: Vec<Activity>,
    pub type_properties_extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OtherActivity {
    pub kind: String,
    pub type_properties: Option<Value>,
}

impl Activity {
    /// Parse an activity node from its ADF JSON form.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        let obj = value.as_object().ok_or(CoreError::NotAnObject)?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or(CoreError::MissingField("name"))?
            .to_string();
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CoreError::MissingField("type"))?
            .to_string();
        let depends_on = obj
            .get("dependsOn")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let policy = obj.get("policy").cloned();
        let user_properties = obj.get("userProperties").cloned();
        let type_properties = obj.get("typeProperties");

        let body = match kind.as_str() {
            "Copy" => ActivityBody::Copy(parse_copy(&name, obj, type_properties)?),
            "ExecutePipeline" => ActivityBody::ExecutePipeline(ExecutePipelineActivity {
                type_properties: type_properties
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            }),
            "ForEach" => {
                let (activities, extra) =
                    parse_container(&name, type_properties, "activities", true)?;
                ActivityBody::ForEach(ForEachActivity {
                    activities: activities.unwrap_or_default(),
                    type_properties_extra: extra,
                })
            }
            "Until" => {
                let (activities, extra) =
                    parse_container(&name, type_properties, "activities", true)?;
                ActivityBody::Until(UntilActivity {
                    activities: activities.unwrap_or_default(),
                    type_properties_extra: extra,
                })
            }
            "IfCondition" => parse_if_condition(&name, type_properties)?,
            "Switch" => parse_switch(&name, type_properties)?,
            _ => ActivityBody::Other(OtherActivity {
                kind: kind.clone(),
                type_properties: type_properties.cloned(),
            }),
        };

        let mut extra = Map::new();
        for (key, value) in obj {
            match key.as_str() {
                "name" | "type" | "dependsOn" | "policy" | "userProperties"
                | "typeProperties" => {}
                "inputs" | "outputs" if matches!(body, ActivityBody::Copy(_)) => {}
                _ => {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(Self {
            name,
            depends_on,
            policy,
            user_properties,
            body,
            extra,
        })
    }

    /// Serialize back to the JSON form. Inverse of [`Activity::from_value`]
    /// for every field the engine preserves.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".into(), Value::String(self.name.clone()));
        obj.insert("type".into(), Value::String(self.kind().to_string()));
        if !self.depends_on.is_empty() {
            obj.insert("dependsOn".into(), Value::Array(self.depends_on.clone()));
        }
        if let Some(policy) = &self.policy {
            obj.insert("policy".into(), policy.clone());
        }
        if let Some(user_properties) = &self.user_properties {
            obj.insert("userProperties".into(), user_properties.clone());
        }
        for (key, value) in &self.extra {
            obj.insert(key.clone(), value.clone());
        }

        match &self.body {
            ActivityBody::Copy(copy) => {
                let mut tp = copy.type_properties_extra.clone();
                if let Some(source) = &copy.source {
                    tp.insert("source".into(), source.clone());
                }
                if let Some(sink) = &copy.sink {
                    tp.insert("sink".into(), sink.clone());
                }
                if !tp.is_empty() {
                    obj.insert("typeProperties".into(), Value::Object(tp));
                }
                if let Some(inputs) = &copy.inputs {
                    obj.insert("inputs".into(), references_to_value(inputs));
                }
                if let Some(outputs) = &copy.outputs {
                    obj.insert("outputs".into(), references_to_value(outputs));
                }
            }
            ActivityBody::ExecutePipeline(execute) => {
                if !execute.type_properties.is_empty() {
                    obj.insert(
                        "typeProperties".into(),
                        Value::Object(execute.type_properties.clone()),
                    );
                }
            }
            ActivityBody::ForEach(for_each) => {
                let mut tp = for_each.type_properties_extra.clone();
                tp.insert("activities".into(), activities_to_value(&for_each.activities));
                obj.insert("typeProperties".into(), Value::Object(tp));
            }
            ActivityBody::Until(until) => {
                let mut tp = until.type_properties_extra.clone();
                tp.insert("activities".into(), activities_to_value(&until.activities));
                obj.insert("typeProperties".into(), Value::Object(tp));
            }
            ActivityBody::IfCondition(if_condition) => {
                let mut tp = if_condition.type_properties_extra.clone();
                if let Some(list) = &if_condition.if_true_activities {
                    tp.insert("ifTrueActivities".into(), activities_to_value(list));
                }
                if let Some(list) = &if_condition.if_false_activities {
                    tp.insert("ifFalseActivities".into(), activities_to_value(list));
                }
                obj.insert("typeProperties".into(), Value::Object(tp));
            }
            ActivityBody::Switch(switch) => {
                let mut tp = switch.type_properties_extra.clone();
                let cases = switch
                    .cases
                    .iter()
                    .map(|case| {
                        let mut case_obj = case.extra.clone();
                        case_obj.insert("activities".into(), activities_to_value(&case.activities));
                        Value::Object(case_obj)
                    })
                    .collect();
                tp.insert("cases".into(), Value::Array(cases));
                if let Some(list) = &switch.default_activities {
                    tp.insert("defaultActivities".into(), activities_to_value(list));
                }
                obj.insert("typeProperties".into(), Value::Object(tp));
            }
            ActivityBody::Other(other) => {
                if let Some(tp) = &other.type_properties {
                    obj.insert("typeProperties".into(), tp.clone());
                }
            }
        }

        Value::Object(obj)
    }

    /// The activity's `type` discriminator.
    pub fn kind(&self) -> &str {
        match &self.body {
            ActivityBody::Copy(_) => "Copy",
            ActivityBody::ExecutePipeline(_) => "ExecutePipeline",
            ActivityBody::ForEach(_) => "ForEach",
            ActivityBody::IfCondition(_) => "IfCondition",
            ActivityBody::Switch(_) => "Switch",
            ActivityBody::Until(_) => "Until",
            ActivityBody::Other(other) => &other.kind,
        }
    }
}

/// Parse an activity list field such as `activities` or `ifTrueActivities`.
pub fn parse_activities(
    parent: &str,
    field: &str,
    value: &Value,
) -> Result<Vec<Activity>, CoreError> {
    let list = value.as_array().ok_or_else(|| {
        CoreError::invalid_activity(parent, format!("`{field}` is not an array"))
    })?;
    list.iter().map(Activity::from_value).collect()
}

fn activities_to_value(activities: &[Activity]) -> Value {
    Value::Array(activities.iter().map(Activity::to_value).collect())
}

fn references_to_value(references: &[DatasetReference]) -> Value {
    Value::Array(references.iter().map(reference_to_value).collect())
}

fn reference_to_value(reference: &DatasetReference) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "referenceName".into(),
        Value::String(reference.reference_name.clone()),
    );
    if !reference.parameters.is_empty() {
        obj.insert("parameters".into(), Value::Object(reference.parameters.clone()));
    }
    for (key, value) in &reference.extra {
        obj.insert(key.clone(), value.clone());
    }
    Value::Object(obj)
}

fn parse_copy(
    name: &str,
    obj: &Map<String, Value>,
    type_properties: Option<&Value>,
) -> Result<CopyActivity, CoreError> {
    let mut copy = CopyActivity::default();
    if let Some(tp) = type_properties.and_then(Value::as_object) {
        for (key, value) in tp {
            match key.as_str() {
                "source" => copy.source = Some(value.clone()),
                "sink" => copy.sink = Some(value.clone()),
                _ => {
                    copy.type_properties_extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
    copy.inputs = obj
        .get("inputs")
        .map(|value| parse_references(name, "inputs", value))
        .transpose()?;
    copy.outputs = obj
        .get("outputs")
        .map(|value| parse_references(name, "outputs", value))
        .transpose()?;
    Ok(copy)
}

fn parse_references(
    activity: &str,
    field: &str,
    value: &Value,
) -> Result<Vec<DatasetReference>, CoreError> {
    serde_json::from_value(value.clone()).map_err(|err| {
        CoreError::invalid_activity(
            activity,
            format!("`{field}` is not a dataset reference list: {err}"),
        )
    })
}

/// Split a container's `typeProperties` into its activity list and the
/// remaining keys. `required` distinguishes ForEach/Until (list mandatory,
/// defaults to empty) from optional branch lists.
fn parse_container(
    name: &str,
    type_properties: Option<&Value>,
    field: &'static str,
    required: bool,
) -> Result<(Option<Vec<Activity>>, Map<String, Value>), CoreError> {
    let mut extra = Map::new();
    let mut activities = None;
    if let Some(tp) = type_properties.and_then(Value::as_object) {
        for (key, value) in tp {
            if key == field {
                activities = Some(parse_activities(name, field, value)?);
            } else {
                extra.insert(key.clone(), value.clone());
            }
        }
    }
    if required && activities.is_none() {
        activities = Some(Vec::new());
    }
    Ok((activities, extra))
}

fn parse_if_condition(
    name: &str,
    type_properties: Option<&Value>,
) -> Result<ActivityBody, CoreError> {
    let mut body = IfConditionActivity::default();
    if let Some(tp) = type_properties.and_then(Value::as_object) {
        for (key, value) in tp {
            match key.as_str() {
                "ifTrueActivities" => {
                    body.if_true_activities = Some(parse_activities(name, key, value)?);
                }
                "ifFalseActivities" => {
                    body.if_false_activities = Some(parse_activities(name, key, value)?);
                }
                _ => {
                    body.type_properties_extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Ok(ActivityBody::IfCondition(body))
}

fn parse_switch(name: &str, type_properties: Option<&Value>) -> Result<ActivityBody, CoreError> {
    let mut body = SwitchActivity::default();
    if let Some(tp) = type_properties.and_then(Value::as_object) {
        for (key, value) in tp {
            match key.as_str() {
                "cases" => {
                    let cases = value.as_array().ok_or_else(|| {
                        CoreError::invalid_activity(name, "`cases` is not an array")
                    })?;
                    for case in cases {
                        let case_obj = case.as_object().ok_or_else(|| {
                            CoreError::invalid_activity(name, "switch case is not an object")
                        })?;
                        let mut parsed = SwitchCase::default();
                        for (case_key, case_value) in case_obj {
                            if case_key == "activities" {
                                parsed.activities =
                                    parse_activities(name, "cases.activities", case_value)?;
                            } else {
                                parsed.extra.insert(case_key.clone(), case_value.clone());
                            }
                        }
                        body.cases.push(parsed);
                    }
                }
                "defaultActivities" => {
                    body.default_activities = Some(parse_activities(name, key, value)?);
                }
                _ => {
                    body.type_properties_extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Ok(ActivityBody::Switch(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn nested_container_round_trip() {
        let raw = json!({
            "name": "LoopFiles",
            "type": "ForEach",
            "dependsOn": [{ "activity": "ListFiles", "dependencyConditions": ["Succeeded"] }],
            "typeProperties": {
                "items": { "value": "@activity('ListFiles').output.childItems", "type": "Expression" },
                "isSequential": false,
                "activities": [
                    {
                        "name": "CheckSize",
                        "type": "IfCondition",
                        "typeProperties": {
                            "expression": { "value": "@greater(item().size, 0)", "type": "Expression" },
                            "ifTrueActivities": [
                                {
                                    "name": "Touch",
                                    "type": "SetVariable",
                                    "typeProperties": { "variableName": "seen", "value": "yes" }
                                }
                            ]
                        }
                    }
                ]
            }
        });

        let activity = Activity::from_value(&raw).unwrap();
        assert_eq!(activity.kind(), "ForEach");
        let ActivityBody::ForEach(for_each) = &activity.body else {
            panic!("expected ForEach body");
        };
        assert_eq!(for_each.activities.len(), 1);
        let ActivityBody::IfCondition(if_condition) = &for_each.activities[0].body else {
            panic!("expected IfCondition body");
        };
        assert!(if_condition.if_true_activities.is_some());
        assert!(if_condition.if_false_activities.is_none());

        assert_eq!(activity.to_value(), raw);
    }

    #[test]
    fn absent_branch_stays_absent() {
        let raw = json!({
            "name": "Branch",
            "type": "IfCondition",
            "typeProperties": {
                "expression": { "value": "@true", "type": "Expression" }
            }
        });
        let activity = Activity::from_value(&raw).unwrap();
        let serialized = activity.to_value();
        let tp = serialized.get("typeProperties").unwrap();
        assert!(tp.get("ifTrueActivities").is_none());
        assert!(tp.get("ifFalseActivities").is_none());
    }

    #[test]
    fn copy_inputs_and_outputs_are_typed() {
        let raw = json!({
            "name": "CopyOrders",
            "type": "Copy",
            "inputs": [{ "referenceName": "AzureSqlTable1", "type": "DatasetReference" }],
            "outputs": [{
                "referenceName": "Parquet1",
                "type": "DatasetReference",
                "parameters": { "p_Directory": "migration" }
            }],
            "typeProperties": {
                "source": { "type": "AzureSqlSource" },
                "sink": { "type": "ParquetSink" },
                "enableStaging": false
            }
        });
        let activity = Activity::from_value(&raw).unwrap();
        let ActivityBody::Copy(copy) = &activity.body else {
            panic!("expected Copy body");
        };
        assert_eq!(
            copy.inputs.as_ref().unwrap()[0].reference_name,
            "AzureSqlTable1"
        );
        assert_eq!(
            copy.outputs.as_ref().unwrap()[0].parameters["p_Directory"],
            json!("migration")
        );
        assert_eq!(copy.type_properties_extra["enableStaging"], json!(false));
        assert_eq!(activity.to_value(), raw);
    }

    #[test]
    fn unknown_activity_type_passes_through() {
        let raw = json!({
            "name": "RunNotebook",
            "type": "DatabricksNotebook",
            "typeProperties": { "notebookPath": "/jobs/clean" },
            "description": "leaves untouched"
        });
        let activity = Activity::from_value(&raw).unwrap();
        assert_eq!(activity.kind(), "DatabricksNotebook");
        assert_eq!(activity.extra["description"], json!("leaves untouched"));
        assert_eq!(activity.to_value(), raw);
    }

    #[test]
    fn missing_name_is_an_error() {
        let raw = json!({ "type": "Wait" });
        let err = Activity::from_value(&raw).unwrap_err();
        assert!(matches!(err, CoreError::MissingField("name")));
    }
}

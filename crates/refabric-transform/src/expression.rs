//! The expression subset the engine understands
//!
//! Substitution is literal string/value replacement, never general ADF
//! expression evaluation. Anything outside the recognized patterns passes
//! through unchanged and is reported as a diagnostic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// A whole-string dataset parameter expression: `@dataset().p_Name`.
static FULL_DATASET_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@dataset\(\)\.([A-Za-z_][A-Za-z0-9_]*)$").expect("static pattern")
});

/// A spliced dataset parameter expression: `@{dataset().p_Name}` inside a
/// longer string.
static INLINE_DATASET_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\{dataset\(\)\.([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern")
});

/// A global parameter usage: `pipeline().globalParameters.Name`. The
/// leading `@` is not part of the pattern, so usages nested inside a
/// larger expression (`@concat(pipeline().globalParameters.a, ...)`) are
/// rewritten too.
static GLOBAL_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pipeline\(\)\.globalParameters\.([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern")
});

/// Substitute dataset parameter expressions in one string field.
///
/// A whole-string expression is replaced by the parameter's JSON value
/// (preserving its type); spliced `@{...}` occurrences are replaced by
/// the value's text form. Missing parameters and unrecognized expressions
/// are left untouched and recorded in `diagnostics`.
pub fn substitute_dataset_expression(
    input: &str,
    parameters: &Map<String, Value>,
    diagnostics: &mut Vec<String>,
) -> Value {
    if let Some(captures) = FULL_DATASET_PARAM.captures(input) {
        let name = &captures[1];
        return match parameters.get(name) {
            Some(value) => value.clone(),
            None => {
                diagnostics.push(format!(
                    "parameter `{name}` is not provided; expression `{input}` passed through"
                ));
                Value::String(input.to_string())
            }
        };
    }

    if INLINE_DATASET_PARAM.is_match(input) {
        let mut missing = Vec::new();
        let spliced = INLINE_DATASET_PARAM.replace_all(input, |captures: &regex::Captures<'_>| {
            let name = captures[1].to_string();
            match parameters.get(&name) {
                Some(value) => value_text(value),
                None => {
                    missing.push(name);
                    captures[0].to_string()
                }
            }
        });
        for name in missing {
            diagnostics.push(format!(
                "parameter `{name}` is not provided; expression `{input}` passed through"
            ));
        }
        let spliced = spliced.into_owned();
        if looks_like_expression(&spliced) {
            diagnostics.push(format!("unrecognized expression passed through: `{spliced}`"));
        }
        return Value::String(spliced);
    }

    if looks_like_expression(input) {
        diagnostics.push(format!("unrecognized expression passed through: `{input}`"));
    }
    Value::String(input.to_string())
}

fn looks_like_expression(text: &str) -> bool {
    text.starts_with('@') || text.contains("@{")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Rewrite global parameter usages in one string according to the
/// name → replacement-expression map. Returns `None` when nothing matched.
pub fn rewrite_global_parameters(
    input: &str,
    rewrites: &BTreeMap<String, String>,
) -> Option<String> {
    if !GLOBAL_PARAM.is_match(input) {
        return None;
    }
    let rewritten = GLOBAL_PARAM.replace_all(input, |captures: &regex::Captures<'_>| {
        rewrites
            .get(&captures[1])
            .cloned()
            .unwrap_or_else(|| captures[0].to_string())
    });
    let rewritten = rewritten.into_owned();
    (rewritten != input).then_some(rewritten)
}

/// Deep-walk a JSON value, rewriting global parameter usages in every
/// string. Copy-on-write at the string level.
pub fn rewrite_value(value: &Value, rewrites: &BTreeMap<String, String>) -> Value {
    if rewrites.is_empty() {
        return value.clone();
    }
    match value {
        Value::String(text) => match rewrite_global_parameters(text, rewrites) {
            Some(rewritten) => Value::String(rewritten),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite_value(item, rewrites))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, field)| (key.clone(), rewrite_value(field, rewrites)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Collect the names of every global parameter used anywhere in a JSON
/// document.
pub fn collect_global_parameters(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::String(text) => {
            for captures in GLOBAL_PARAM.captures_iter(text) {
                found.insert(captures[1].to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_global_parameters(item, found);
            }
        }
        Value::Object(fields) => {
            for field in fields.values() {
                collect_global_parameters(field, found);
            }
        }
        _ => {}
    }
}

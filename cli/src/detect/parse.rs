//! Tolerant parsing of classifier output.
//!
//! Models wrap JSON in markdown fences, rename keys, or return a bare array;
//! all of these are accepted. Anything that is not recognisably a PII list is
//! an error.

use super::DetectError;
use blackout_core::PiiInstance;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

const LIST_KEYS: [&str; 3] = ["pii", "instances", "entities"];
const VALUE_KEYS: [&str; 2] = ["value", "text"];
const CATEGORY_KEYS: [&str; 3] = ["category", "type", "label"];
const UNKNOWN_CATEGORY: &str = "UNKNOWN";

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("fence pattern compiles"));

/// Parses a completion into PII instances, dropping empty values and exact
/// `(value, category)` duplicates while keeping first-seen order.
pub fn parse_instances(raw: &str) -> Result<Vec<PiiInstance>, DetectError> {
    let body = FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str())
        .trim();

    let value = parse_json(body)?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => LIST_KEYS
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(Value::Array(entries)) => Some(entries),
                _ => None,
            })
            .ok_or_else(|| DetectError::Parse("no PII list in response object".to_string()))?,
        other => {
            return Err(DetectError::Parse(format!(
                "expected an object or array, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut seen = HashSet::new();
    let mut instances = Vec::new();
    for entry in entries {
        let Some(instance) = entry_to_instance(entry) else {
            continue;
        };
        if seen.insert((instance.value.clone(), instance.category.clone())) {
            instances.push(instance);
        }
    }
    Ok(instances)
}

/// Parses `body`, falling back to the outermost `{..}` or `[..]` when the
/// model surrounded the JSON with prose.
fn parse_json(body: &str) -> Result<Value, DetectError> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => {
            let start = body.find(['{', '[']);
            let end = body.rfind(['}', ']']);
            match (start, end) {
                (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end])
                    .map_err(|e| DetectError::Parse(e.to_string())),
                _ => Err(DetectError::Parse(first.to_string())),
            }
        }
    }
}

fn entry_to_instance(entry: Value) -> Option<PiiInstance> {
    match entry {
        Value::String(value) => {
            let value = value.trim();
            (!value.is_empty()).then(|| PiiInstance::new(value, UNKNOWN_CATEGORY))
        }
        Value::Object(object) => {
            let value = first_string(&object, &VALUE_KEYS)?;
            let category = first_string(&object, &CATEGORY_KEYS)
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
            Some(PiiInstance::new(value, category))
        }
        _ => None,
    }
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

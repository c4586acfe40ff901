//! Whitelist validation of tool arguments against a JSON object schema
//!
//! Only the subset the built-in and planner-facing tools use is understood:
//! `properties` with primitive `type`s, and `required`. Anything not declared
//! under `properties` is rejected.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // unknown keywords are not ours to enforce
        _ => true,
    }
}

fn declared(schema: &Value) -> Option<&Map<String, Value>> {
    schema.get("properties").and_then(Value::as_object)
}

/// Check `input` against `schema`.
///
/// # Errors
/// [`Error::InvalidInput`] naming the first offending argument.
pub fn validate_against_schema(schema: &Value, input: &Value) -> Result<()> {
    let args = input
        .as_object()
        .ok_or_else(|| Error::InvalidInput("arguments must be a JSON object".to_string()))?;

    let missing = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|name| !args.contains_key(*name));
    if let Some(name) = missing {
        return Err(Error::InvalidInput(format!("'{name}' is required")));
    }

    let properties = declared(schema);
    for (name, value) in args {
        let rule = properties
            .and_then(|p| p.get(name))
            .ok_or_else(|| Error::InvalidInput(format!("'{name}' is not an accepted argument")))?;

        if let Some(expected) = rule.get("type").and_then(Value::as_str) {
            if !matches_type(expected, value) {
                return Err(Error::InvalidInput(format!(
                    "'{name}' should be {expected}, got {value}"
                )));
            }
        }
    }

    Ok(())
}

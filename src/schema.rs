//! Tool Schema Sanitizer
//!
//! MCP servers publish JSON Schema for tool parameters. Gemini's function
//! declarations reject `additionalProperties`, so it is stripped at every depth
//! before the schema is handed to the model.

use serde_json::{Map, Value};

/// Key rejected by the function-calling interface
pub const DISALLOWED_KEY: &str = "additionalProperties";

/// Remove every `additionalProperties` key from a schema.
///
/// Objects and arrays are rebuilt recursively, scalars are kept as they are.
/// Anything that is not an object at the top level is returned unchanged.
pub fn clean_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(clean_object(map)),
        other => other.clone(),
    }
}

fn clean_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| key.as_str() != DISALLOWED_KEY)
        .map(|(key, value)| (key.clone(), clean_value(value)))
        .collect()
}

fn clean_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(clean_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(clean_value).collect()),
        scalar => scalar.clone(),
    }
}

//! Accessors over the generic configuration value.

use serde_yaml::Value;

/// Render a scalar as text. `null` and collections yield `None`.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => text(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Compact single-line rendering used in error messages.
pub fn describe(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// Entries of a mapping in document order; anything else is empty.
///
/// Keys that are not scalars are skipped.
pub fn mapping_entries(value: Option<&Value>) -> Vec<(String, &Value)> {
    let Some(Value::Mapping(map)) = value else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| text(key).map(|key| (key, value)))
        .collect()
}

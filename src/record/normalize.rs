use serde_json::Value;

/// Flatten any JSON value into one searchable string.
///
/// Strings pass through, numbers and booleans use their display form, arrays
/// and objects are flattened element by element and joined with a single
/// space. Object keys are dropped, only values are kept. Absent and `null`
/// values become the empty string.
pub fn flatten(value: Option<&Value>) -> String {
    value.map(flatten_value).unwrap_or_default()
}

pub fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(flatten_value).collect::<Vec<_>>().join(" "),
        Value::Object(map) => map.values().map(flatten_value).collect::<Vec<_>>().join(" "),
    }
}

/// Flatten and trim, returning `None` when nothing is left.
pub fn flatten_non_empty(value: Option<&Value>) -> Option<String> {
    let text = flatten(value);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

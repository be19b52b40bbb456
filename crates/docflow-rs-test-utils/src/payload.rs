use docflow_rs_memory::ExtractedValues;
use serde_json::Value;

/// Turn a `json!` object literal into an extracted-values map.
///
/// Non-object values are wrapped as `{"value": ...}`.
pub fn values(value: Value) -> ExtractedValues {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = ExtractedValues::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

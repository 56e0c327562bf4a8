// Helpers for projecting JSON payloads into flat logging labels

use serde_json::{Map, Value};

/// True only for JSON objects; arrays, scalars and null are not objects.
pub fn is_object(value: &Value) -> bool {
    matches!(value, Value::Object(_))
}

/// Flatten nested objects into dot-separated keys.
///
/// Arrays are kept whole as leaves. An empty nested object contributes no keys,
/// and a non-object input produces an empty map.
pub fn flatten_object(value: &Value) -> Map<String, Value> {
    let mut flat = Map::new();
    if let Value::Object(map) = value {
        flatten_into(&mut flat, "", map);
    }
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = format!("{}{}", prefix, key);
        match value {
            Value::Object(nested) => flatten_into(flat, &format!("{}.", path), nested),
            leaf => {
                flat.insert(path, leaf.clone());
            }
        }
    }
}

/// Render a label value the way log backends expect: strings verbatim, anything
/// else as compact JSON.
pub fn label_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

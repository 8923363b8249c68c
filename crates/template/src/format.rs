//! Formatting rule for a resolved value: `null`/`undefined` → empty string;
//! number/boolean → canonical text; object/array → compact JSON; strings
//! pass through unquoted.

use serde_json::Value;

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_formats_empty() {
        assert_eq!(format_value(&Value::Null), "");
    }

    #[test]
    fn object_formats_compact_json() {
        assert_eq!(format_value(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn string_passes_through_unquoted() {
        assert_eq!(format_value(&json!("hi")), "hi");
    }
}

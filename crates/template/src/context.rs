//! Ambient `Context` carried alongside template interpolation: upstream
//! outputs in scheduling order, plus free-form ambient variables reachable
//! via `{{ctx.PATH}}`.

use serde_json::Value;

/// Fields of an upstream output treated as interchangeable "the interesting
/// part of this payload" when a plain field name doesn't resolve directly.
pub const COMMON_FIELD_ALIASES: &[&str] = &["response", "result", "output", "data", "content", "text"];

#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Upstream node outputs, in the order the engine scheduled them.
    pub previous_outputs: Vec<(String, Value)>,
    /// Ambient variables reachable via `{{ctx.PATH}}` (executionId, userId, …).
    pub ambient: Value,
}

impl Context {
    pub fn new() -> Self {
        Self {
            previous_outputs: Vec::new(),
            ambient: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_ambient(ambient: Value) -> Self {
        Self {
            previous_outputs: Vec::new(),
            ambient,
        }
    }

    pub fn record_output(&mut self, node_id: impl Into<String>, output: Value) {
        self.previous_outputs.push((node_id.into(), output));
    }

    pub fn last_output(&self) -> Option<&Value> {
        self.previous_outputs.last().map(|(_, v)| v)
    }

    pub fn output_for(&self, node_id: &str) -> Option<&Value> {
        self.previous_outputs
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, v)| v)
            .or_else(|| {
                self.previous_outputs
                    .iter()
                    .find(|(id, _)| id.contains(node_id) || node_id.contains(id.as_str()))
                    .map(|(_, v)| v)
            })
    }
}

use crate::path::resolve_path;

/// Resolve `path` against a single upstream output using the (a)/(b)/(c)
/// ladder from the interpolator's precedence rule 1: direct path, then the
/// output's own common-field aliases, then the same two steps one level
/// deeper inside every object-typed field of the output.
pub fn resolve_in_output(output: &Value, path: &str) -> Option<Value> {
    if let Some(v) = resolve_path(output, path) {
        return Some(v);
    }
    if let Some(v) = resolve_via_aliases(output, path) {
        return Some(v);
    }
    if let Value::Object(map) = output {
        for field in map.values() {
            if field.is_object() {
                if let Some(v) = resolve_path(field, path) {
                    return Some(v);
                }
                if let Some(v) = resolve_via_aliases(field, path) {
                    return Some(v);
                }
            }
        }
    }
    None
}

fn resolve_via_aliases(value: &Value, path: &str) -> Option<Value> {
    let obj = value.as_object()?;
    for alias in COMMON_FIELD_ALIASES {
        if let Some(alias_value) = obj.get(*alias) {
            if let Some(v) = resolve_path(alias_value, path) {
                return Some(v);
            }
        }
    }
    None
}

/// Precedence rule 1: `{data.PATH}` — scan previous outputs in scheduling
/// order, stop at the first one where `path` resolves.
pub fn resolve_data_path(ctx: &Context, path: &str) -> Option<Value> {
    ctx.previous_outputs
        .iter()
        .find_map(|(_, output)| resolve_in_output(output, path))
}

/// Precedence rule 2: `{previousBlock.PATH}` — only the last scheduled output.
pub fn resolve_previous_block_path(ctx: &Context, path: &str) -> Option<Value> {
    ctx.last_output().and_then(|output| resolve_in_output(output, path))
}

/// Precedence rule 3: `{NODEID.PATH}` — exact id match, then substring match
/// in either direction.
pub fn resolve_node_path(ctx: &Context, node_id: &str, path: &str) -> Option<Value> {
    ctx.output_for(node_id).and_then(|output| resolve_in_output(output, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_alias_lookup_finds_leaf() {
        let output = json!({ "response": { "text": "hi" } });
        assert_eq!(resolve_in_output(&output, "text"), Some(json!("hi")));
    }

    #[test]
    fn data_path_stops_at_first_match() {
        let mut ctx = Context::new();
        ctx.record_output("a", json!({ "id": 1 }));
        ctx.record_output("b", json!({ "id": 2 }));
        assert_eq!(resolve_data_path(&ctx, "id"), Some(json!(1)));
    }

    #[test]
    fn previous_block_only_looks_at_last() {
        let mut ctx = Context::new();
        ctx.record_output("a", json!({ "id": 1 }));
        ctx.record_output("b", json!({ "id": 2 }));
        assert_eq!(resolve_previous_block_path(&ctx, "id"), Some(json!(2)));
    }

    #[test]
    fn node_path_falls_back_to_substring_match() {
        let mut ctx = Context::new();
        ctx.record_output("fetch_weather_node", json!({ "temp": 72 }));
        assert_eq!(resolve_node_path(&ctx, "weather", "temp"), Some(json!(72)));
    }
}

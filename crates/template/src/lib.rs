//! Template Interpolator.
//!
//! A pure, side-effect-free expression language for binding a block's
//! configured parameters to the outputs of upstream blocks. See the
//! module docs on [`interpolate`] for the grammar and precedence rules.

pub mod context;
pub mod error;
mod format;
mod functions;
mod path;

pub use context::Context;
pub use error::TemplateError;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use context::{resolve_data_path, resolve_node_path, resolve_previous_block_path};
use format::format_value;
use functions::{call as call_fn, split_args, FN_NAMES};
use path::resolve_path;

/// One bracketed expression (or the literal text between them) found while
/// scanning a template string.
enum Segment<'a> {
    Text(&'a str),
    Single(&'a str),
    Double(&'a str),
}

/// Split `template` into literal text and recognized `{…}` / `{{…}}`
/// expressions, left to right. Does not evaluate anything; callers decide
/// what to do with each segment.
fn scan(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut i = 0;
    let mut text_start = 0;

    while i < template.len() {
        if template[i..].starts_with("{{") {
            if text_start < i {
                segments.push(Segment::Text(&template[text_start..i]));
            }
            let after = i + 2;
            let end = template[after..].find("}}").ok_or(TemplateError::Unbalanced)?;
            segments.push(Segment::Double(&template[after..after + end]));
            i = after + end + 2;
            text_start = i;
        } else if template.as_bytes().get(i) == Some(&b'{') {
            if text_start < i {
                segments.push(Segment::Text(&template[text_start..i]));
            }
            let after = i + 1;
            let end = template[after..].find('}').ok_or(TemplateError::Unbalanced)?;
            segments.push(Segment::Single(&template[after..after + end]));
            i = after + end + 1;
            text_start = i;
        } else {
            let ch_len = template[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
            i += ch_len;
        }
    }
    if text_start < template.len() {
        segments.push(Segment::Text(&template[text_start..]));
    }
    Ok(segments)
}

/// Precedence rules 1–3: `{ident(.path)?}` against `previousOutputs`.
fn eval_single(inner: &str, ctx: &Context) -> Value {
    let (ident, rest) = match inner.find('.') {
        Some(dot) => (&inner[..dot], &inner[dot + 1..]),
        None => (inner, ""),
    };
    let resolved = match ident {
        "data" => resolve_data_path(ctx, rest),
        "previousBlock" => resolve_previous_block_path(ctx, rest),
        node_id => resolve_node_path(ctx, node_id, rest),
    };
    resolved.unwrap_or(Value::Null)
}

/// Precedence rules 4–6: `{{dataref | builtin | fncall | ctx.path}}`.
fn eval_double(inner: &str, data: &Value, ctx: &Context) -> Result<Value, TemplateError> {
    if inner == "$now" {
        return Ok(Value::String(Utc::now().to_rfc3339()));
    }
    if inner == "$uuid" {
        return Ok(Value::String(Uuid::new_v4().to_string()));
    }
    if let Some(rest) = inner.strip_prefix('$') {
        let open = rest.find('(').ok_or_else(|| TemplateError::UnknownFunction(inner.to_string()))?;
        if !rest.ends_with(')') {
            return Err(TemplateError::UnknownFunction(inner.to_string()));
        }
        let name = &rest[..open];
        let arg_str = &rest[open + 1..rest.len() - 1];
        let args = split_args(arg_str);
        return call_fn(name, &args, data);
    }
    if let Some(path) = inner.strip_prefix("ctx.") {
        return Ok(resolve_path(&ctx.ambient, path).unwrap_or(Value::Null));
    }
    if let Some(path) = inner.strip_prefix("json.") {
        return Ok(resolve_path(data, path).unwrap_or(Value::Null));
    }
    // bare `{{PATH}}`: resolve against `data`; fall back to the
    // `{data.…}` previousOutputs resolver when PATH starts with `data.`.
    if let Some(v) = resolve_path(data, inner) {
        return Ok(v);
    }
    if let Some(path) = inner.strip_prefix("data.") {
        return Ok(resolve_data_path(ctx, path).unwrap_or(Value::Null));
    }
    Ok(Value::Null)
}

/// Substitute every recognized expression in `template` against `data` and
/// `ctx`, returning the rendered string. A template with no recognized
/// expressions is returned unchanged.
pub fn interpolate(template: &str, data: &Value, ctx: &Context) -> Result<String, TemplateError> {
    let segments = scan(template)?;
    let mut out = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Single(inner) => out.push_str(&format_value(&eval_single(inner, ctx))),
            Segment::Double(inner) => out.push_str(&format_value(&eval_double(inner, data, ctx)?)),
        }
    }
    Ok(out)
}

/// Walk a `node.config` JSON value recursively, interpolating every string
/// leaf that contains template markers; every other value passes through
/// unchanged.
pub fn resolve_config(config: &Value, data: &Value, ctx: &Context) -> Result<Value, TemplateError> {
    match config {
        Value::String(s) => {
            if s.contains('{') {
                Ok(Value::String(interpolate(s, data, ctx)?))
            } else {
                Ok(config.clone())
            }
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_config(item, data, ctx)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_config(v, data, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Every expression referenced in `template`, rendered as its original
/// bracketed text (`"{data.x}"`, `"{{json.y}}"`, …), for dependency analysis.
pub fn get_variables(template: &str) -> Vec<String> {
    let Ok(segments) = scan(template) else {
        return Vec::new();
    };
    segments
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Single(inner) => Some(format!("{{{inner}}}")),
            Segment::Double(inner) => Some(format!("{{{{{inner}}}}}")),
            Segment::Text(_) => None,
        })
        .collect()
}

fn is_valid_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_path(s: &str) -> bool {
    s.is_empty() || s.split('.').all(is_valid_segment)
}

fn is_valid_segment(seg: &str) -> bool {
    let name_end = seg.find('[').unwrap_or(seg.len());
    let name = &seg[..name_end];
    if !name.is_empty() && !is_valid_ident(name) {
        return false;
    }
    let mut rest = &seg[name_end..];
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return false;
        }
        let Some(close) = rest.find(']') else { return false };
        let idx = &rest[1..close];
        if idx.is_empty() || !idx.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        rest = &rest[close + 1..];
    }
    true
}

fn valid_single(inner: &str) -> bool {
    let (ident, rest) = match inner.find('.') {
        Some(dot) => (&inner[..dot], &inner[dot + 1..]),
        None => (inner, ""),
    };
    is_valid_ident(ident) && is_valid_path(rest)
}

fn valid_double(inner: &str) -> bool {
    if inner == "$now" || inner == "$uuid" {
        return true;
    }
    if let Some(rest) = inner.strip_prefix('$') {
        let Some(open) = rest.find('(') else { return false };
        if !rest.ends_with(')') {
            return false;
        }
        let name = &rest[..open];
        return FN_NAMES.contains(&name);
    }
    if let Some(path) = inner.strip_prefix("ctx.") {
        return is_valid_path(path);
    }
    if let Some(path) = inner.strip_prefix("json.") {
        return is_valid_path(path);
    }
    is_valid_path(inner)
}

/// A template is valid iff `{{`/`}}` and `{`/`}` are balanced and every
/// payload matches one of the recognized grammar patterns.
pub fn validate(template: &str) -> Result<(), TemplateError> {
    for segment in scan(template)? {
        match segment {
            Segment::Single(inner) if !valid_single(inner) => {
                return Err(TemplateError::Unbalanced);
            }
            Segment::Double(inner) if !valid_double(inner) => {
                return Err(TemplateError::UnknownFunction(inner.to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_round_trips_unchanged() {
        let ctx = Context::new();
        let rendered = interpolate("hello world", &json!({}), &ctx).unwrap();
        assert_eq!(rendered, "hello world");
        assert!(get_variables(&rendered).is_empty());
    }

    #[test]
    fn data_precedence_resolves_first_match() {
        let mut ctx = Context::new();
        ctx.record_output("fetch", json!({ "id": 7 }));
        let rendered = interpolate("id={data.id}", &json!({}), &ctx).unwrap();
        assert_eq!(rendered, "id=7");
    }

    #[test]
    fn nested_fallback_resolves_through_alias() {
        let mut ctx = Context::new();
        ctx.record_output("upstream", json!({ "response": { "text": "hi" } }));
        let rendered = interpolate("{data.text}", &json!({}), &ctx).unwrap();
        assert_eq!(rendered, "hi");
    }

    #[test]
    fn json_path_resolves_against_data() {
        let ctx = Context::new();
        let data = json!({ "user": { "name": "ada" } });
        let rendered = interpolate("hi {{json.user.name}}", &data, &ctx).unwrap();
        assert_eq!(rendered, "hi ada");
    }

    #[test]
    fn bare_double_path_falls_back_to_data_resolver() {
        let mut ctx = Context::new();
        ctx.record_output("a", json!({ "id": 3 }));
        let rendered = interpolate("{{data.id}}", &json!({}), &ctx).unwrap();
        assert_eq!(rendered, "3");
    }

    #[test]
    fn ctx_path_resolves_ambient_variables() {
        let ctx = Context::with_ambient(json!({ "executionId": "abc-123" }));
        let rendered = interpolate("exec={{ctx.executionId}}", &json!({}), &ctx).unwrap();
        assert_eq!(rendered, "exec=abc-123");
    }

    #[test]
    fn builtin_now_produces_rfc3339() {
        let ctx = Context::new();
        let rendered = interpolate("{{$now}}", &json!({}), &ctx).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&rendered).is_ok());
    }

    #[test]
    fn format_number_function_applies_decimals() {
        let ctx = Context::new();
        let data = json!({ "amount": 12.3456 });
        let rendered = interpolate("{{$formatNumber(json.amount, 2)}}", &data, &ctx).unwrap();
        assert_eq!(rendered, "12.35");
    }

    #[test]
    fn unknown_function_is_an_error() {
        let ctx = Context::new();
        let err = interpolate("{{$bogus(1)}}", &json!({}), &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFunction(_)));
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        let ctx = Context::new();
        let err = interpolate("hello {data.id", &json!({}), &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::Unbalanced));
    }

    #[test]
    fn validate_accepts_well_formed_template() {
        assert!(validate("hi {data.x} and {{$uppercase(json.y)}}").is_ok());
    }

    #[test]
    fn validate_rejects_unknown_function_name() {
        assert!(validate("{{$explode(1)}}").is_err());
    }

    #[test]
    fn resolve_config_recurses_into_nested_structures() {
        let ctx = Context::new();
        let data = json!({ "x": 1 });
        let config = json!({ "url": "https://example.com/{{json.x}}", "nested": { "v": "{{json.x}}" } });
        let resolved = resolve_config(&config, &data, &ctx).unwrap();
        assert_eq!(resolved["url"], json!("https://example.com/1"));
        assert_eq!(resolved["nested"]["v"], json!("1"));
    }
}

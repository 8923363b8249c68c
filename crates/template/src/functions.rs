//! Built-in `{{$fn(...)}}` functions.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;

use crate::error::TemplateError;
use crate::path::resolve_path;

/// Split a function-call argument list on top-level commas, respecting
/// double-quoted string literals.
pub fn split_args(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut current = String::new();

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth -= 1;
                current.push(c);
            }
            ',' if !in_quotes && depth == 0 => {
                args.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Evaluate a single function argument: `json.PATH`, a quoted string
/// literal, or a bare numeric/literal token.
pub fn eval_arg(arg: &str, data: &Value) -> Value {
    let arg = arg.trim();
    if let Some(path) = arg.strip_prefix("json.") {
        return resolve_path(data, path).unwrap_or(Value::Null);
    }
    if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        return Value::String(arg[1..arg.len() - 1].to_string());
    }
    if let Ok(n) = arg.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = arg.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(arg.to_string())
}

fn as_f64(v: &Value, fn_name: &str) -> Result<f64, TemplateError> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
        .ok_or_else(|| TemplateError::InvalidArgs(fn_name.to_string(), "expected a number".to_string()))
}

fn as_string(v: &Value) -> String {
    crate::format::format_value(v)
}

/// Dispatch a builtin function call. `args` are the raw (unevaluated) text
/// of each argument; most are evaluated against `data` via `eval_arg`.
pub fn call(name: &str, args: &[String], data: &Value) -> Result<Value, TemplateError> {
    match name {
        "randomInt" => {
            let min = as_f64(&eval_arg(args.get(0).map(String::as_str).unwrap_or("0"), data), name)? as i64;
            let max = as_f64(&eval_arg(args.get(1).map(String::as_str).unwrap_or("0"), data), name)? as i64;
            let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
            let value = rand::thread_rng().gen_range(lo..=hi);
            Ok(Value::from(value))
        }
        "randomFloat" => {
            let min = as_f64(&eval_arg(args.get(0).map(String::as_str).unwrap_or("0"), data), name)?;
            let max = as_f64(&eval_arg(args.get(1).map(String::as_str).unwrap_or("0"), data), name)?;
            let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
            let value = rand::thread_rng().gen_range(lo..=hi);
            Ok(Value::from(value))
        }
        "randomString" => {
            let n = args
                .get(0)
                .map(|a| eval_arg(a, data))
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                .unwrap_or(8)
                .max(0) as usize;
            const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
            let mut rng = rand::thread_rng();
            let s: String = (0..n)
                .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
                .collect();
            Ok(Value::String(s))
        }
        "formatDate" => {
            let expr = args.get(0).map(|a| eval_arg(a, data)).unwrap_or(Value::Null);
            let fmt = args.get(1).map(|a| eval_arg(a, data)).map(|v| as_string(&v)).unwrap_or_default();
            let raw = as_string(&expr);
            let dt = DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            let formatted = match fmt.as_str() {
                "YYYY-MM-DD" => dt.format("%Y-%m-%d").to_string(),
                "MM/DD/YYYY" => dt.format("%m/%d/%Y").to_string(),
                "DD/MM/YYYY" => dt.format("%d/%m/%Y").to_string(),
                _ => dt.to_rfc3339(),
            };
            Ok(Value::String(formatted))
        }
        "formatNumber" => {
            let n = as_f64(&eval_arg(args.get(0).map(String::as_str).unwrap_or("0"), data), name)?;
            let d = args
                .get(1)
                .map(|a| eval_arg(a, data))
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as usize;
            Ok(Value::String(format!("{:.*}", d, n)))
        }
        "formatCurrency" => {
            let n = as_f64(&eval_arg(args.get(0).map(String::as_str).unwrap_or("0"), data), name)?;
            let cur = args.get(1).map(|a| eval_arg(a, data)).map(|v| as_string(&v)).unwrap_or_default();
            Ok(Value::String(format!("{} {:.2}", cur, n)))
        }
        "uppercase" => {
            let s = as_string(&eval_arg(args.get(0).map(String::as_str).unwrap_or(""), data));
            Ok(Value::String(s.to_uppercase()))
        }
        "lowercase" => {
            let s = as_string(&eval_arg(args.get(0).map(String::as_str).unwrap_or(""), data));
            Ok(Value::String(s.to_lowercase()))
        }
        "substring" => {
            let s = as_string(&eval_arg(args.get(0).map(String::as_str).unwrap_or(""), data));
            let start = args.get(1).map(|a| eval_arg(a, data)).and_then(|v| v.as_i64()).unwrap_or(0).max(0) as usize;
            let end = args
                .get(2)
                .map(|a| eval_arg(a, data))
                .and_then(|v| v.as_i64())
                .map(|e| e.max(0) as usize)
                .unwrap_or(s.chars().count());
            let chars: Vec<char> = s.chars().collect();
            let end = end.min(chars.len());
            let start = start.min(end);
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

pub const FN_NAMES: &[&str] = &[
    "randomInt",
    "randomFloat",
    "randomString",
    "formatDate",
    "formatNumber",
    "formatCurrency",
    "uppercase",
    "lowercase",
    "substring",
];

//! Dot-notation path resolution with `[i]` array indexing against `serde_json::Value`.

use serde_json::Value;

/// Resolve `path` (e.g. `"user.addresses[0].city"`) against `root`.
///
/// Returns `None` when any segment along the way is missing or the wrong
/// shape (object field on a non-object, out-of-range index, etc).
pub fn resolve_path(root: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(root.clone());
    }

    let mut current = root;
    for segment in path.split('.') {
        let (name, indices) = split_segment(segment);

        current = if name.is_empty() {
            current
        } else {
            current.as_object()?.get(name)?
        };

        for idx in indices {
            current = current.as_array()?.get(idx)?;
        }
    }
    Some(current.clone())
}

/// Split `foo[0][1]` into `("foo", [0, 1])`. A bare `[0]` segment (no name)
/// yields `("", [0])`, which indexes directly into the current value.
fn split_segment(segment: &str) -> (&str, Vec<usize>) {
    let mut indices = Vec::new();
    let name_end = segment.find('[').unwrap_or(segment.len());
    let name = &segment[..name_end];

    let mut rest = &segment[name_end..];
    while let Some(open) = rest.find('[') {
        if let Some(close) = rest[open..].find(']') {
            if let Ok(idx) = rest[open + 1..open + close].parse::<usize>() {
                indices.push(idx);
            }
            rest = &rest[open + close + 1..];
        } else {
            break;
        }
    }
    (name, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_object_path() {
        let data = json!({ "user": { "name": "ada" } });
        assert_eq!(resolve_path(&data, "user.name"), Some(json!("ada")));
    }

    #[test]
    fn resolves_array_index() {
        let data = json!({ "items": [ {"id": 1}, {"id": 2} ] });
        assert_eq!(resolve_path(&data, "items[1].id"), Some(json!(2)));
    }

    #[test]
    fn missing_path_is_none() {
        let data = json!({ "a": 1 });
        assert_eq!(resolve_path(&data, "b.c"), None);
    }

    #[test]
    fn empty_path_returns_root() {
        let data = json!({ "a": 1 });
        assert_eq!(resolve_path(&data, ""), Some(data));
    }

    #[test]
    fn out_of_range_index_is_none() {
        let data = json!({ "items": [1, 2] });
        assert_eq!(resolve_path(&data, "items[5]"), None);
    }
}

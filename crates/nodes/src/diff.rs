//! Structured diffing between two agent snapshots.

use serde_json::Value;

use crate::replay::AgentSnapshot;

/// A single top-level field that differs between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

/// Result of comparing an original snapshot against a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff {
    /// Fraction of compared fields that matched exactly, in `[0.0, 1.0]`.
    pub similarity: f64,
    pub changes: Vec<FieldDiff>,
}

const COMPARED_FIELDS: [&str; 4] = ["config", "steps", "toolCalls", "results"];

fn field_value<'a>(snapshot: &'a AgentSnapshot, field: &str) -> &'a Value {
    match field {
        "config" => &snapshot.config,
        "steps" => &snapshot.steps,
        "toolCalls" => &snapshot.tool_calls,
        "results" => &snapshot.result,
        _ => unreachable!("field set is fixed above"),
    }
}

/// Compare two snapshots over `{config, steps, toolCalls, results}` and
/// report both a similarity score and the fields that actually differ.
pub fn compare_snapshots(original: &AgentSnapshot, replay: &AgentSnapshot) -> SnapshotDiff {
    let mut changes = Vec::new();
    let mut matched = 0usize;

    for field in COMPARED_FIELDS {
        let before = field_value(original, field);
        let after = field_value(replay, field);

        if before == after {
            matched += 1;
        } else {
            changes.push(FieldDiff {
                field: field.to_string(),
                before: before.clone(),
                after: after.clone(),
            });
        }
    }

    SnapshotDiff {
        similarity: matched as f64 / COMPARED_FIELDS.len() as f64,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn snapshot(result: Value) -> AgentSnapshot {
        AgentSnapshot {
            id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            node_id: "agent-1".to_string(),
            config: json!({"prompt": "hi"}),
            steps: json!([{"index": 0, "kind": "answer"}]),
            tool_calls: json!([]),
            result: result,
        }
    }

    #[test]
    fn identical_snapshots_score_perfect_similarity() {
        let a = snapshot(json!({"text": "hi back"}));
        let b = snapshot(json!({"text": "hi back"}));
        let diff = compare_snapshots(&a, &b);
        assert_eq!(diff.similarity, 1.0);
        assert!(diff.changes.is_empty());
    }

    #[test]
    fn a_changed_result_is_reported_and_lowers_similarity() {
        let a = snapshot(json!({"text": "hi back"}));
        let b = snapshot(json!({"text": "something else"}));
        let diff = compare_snapshots(&a, &b);
        assert!(diff.similarity < 1.0);
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].field, "results");
    }
}

//! Scheduling-logic tests for the execution engine.
//!
//! `WorkflowExecutor::run` needs a live `DbPool` (it persists every
//! `WorkflowExecution`/`NodeExecution` row as it goes), so it isn't
//! exercised here. These tests drive the same `DagPlan` + `BlockHandler`
//! machinery the executor uses, standing in for its scheduling loop by
//! hand so the ready-frontier / template-resolution / failure-isolation
//! logic is covered without a database. DB-backed end-to-end tests belong
//! in `tests/integration/`, gated behind a live Postgres.

use std::collections::HashSet;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use engine::models::{Edge, NodeDefinition};
use engine::{dag::validate_dag, Trigger, Workflow};
use nodes::mock::MockHandler;
use nodes::services::Services;
use nodes::{BlockHandler, ExecutionContext, HandlerError};

fn node(id: &str) -> NodeDefinition {
    NodeDefinition { id: id.to_string(), block_type: "mock".into(), config: Value::Null }
}

fn linear_workflow(ids: &[&str]) -> Workflow {
    let nodes: Vec<NodeDefinition> = ids.iter().map(|id| node(id)).collect();
    let edges: Vec<Edge> = ids.windows(2).map(|w| Edge::new(w[0], w[1])).collect();
    Workflow::new("test-linear", Trigger::Manual, nodes, edges)
}

fn make_ctx(workflow: &Workflow, previous_outputs: Vec<(String, Value)>) -> ExecutionContext {
    ExecutionContext {
        workflow_id: workflow.id,
        execution_id: Uuid::new_v4(),
        user_id: None,
        workflow_data: json!({}),
        previous_outputs,
        services: Services::default(),
        cancellation: CancellationToken::new(),
    }
}

/// Drive `workflow` by hand, in `DagPlan` order, through `handlers`,
/// stopping the first time a handler fails (independent branches are not
/// modelled here — this mirrors a single chain, matching the executor's
/// "a failed node's dependents never become ready" rule for the simple
/// linear case).
async fn run_linear(
    workflow: &Workflow,
    handlers: &[(&str, MockHandler)],
) -> (Vec<String>, Result<Value, HandlerError>) {
    let plan = validate_dag(workflow).expect("valid dag");
    let handler_map: std::collections::HashMap<&str, &MockHandler> =
        handlers.iter().map(|(id, h)| (*id, h)).collect();

    let mut previous_outputs = Vec::new();
    let mut order = Vec::new();
    let mut last_result = Ok(Value::Null);

    for node_id in &plan.order {
        let handler = handler_map[node_id.as_str()];
        let ctx = make_ctx(workflow, previous_outputs.clone());
        let spec = nodes::NodeSpec { id: node_id.clone(), block_type: "mock".into(), config: Value::Null };

        order.push(node_id.clone());
        match handler.execute(&spec, &ctx).await {
            Ok(output) => {
                previous_outputs.push((node_id.clone(), output.clone()));
                last_result = Ok(output);
            }
            Err(e) => {
                last_result = Err(e);
                break;
            }
        }
    }

    (order, last_result)
}

#[tokio::test]
async fn three_node_pipeline_runs_in_topological_order() {
    let wf = linear_workflow(&["node_a", "node_b", "node_c"]);

    let handlers = vec![
        ("node_a", MockHandler::returning("mock", json!({ "step": 1 }))),
        ("node_b", MockHandler::returning("mock", json!({ "step": 2 }))),
        ("node_c", MockHandler::returning("mock", json!({ "step": 3 }))),
    ];

    let (order, result) = run_linear(&wf, &handlers).await;

    assert_eq!(order, vec!["node_a", "node_b", "node_c"]);
    let output = result.expect("pipeline should succeed");
    assert_eq!(output["node"], "node_c");
    assert_eq!(output["step"], 3);

    for (_, h) in &handlers {
        assert_eq!(h.call_count(), 1);
    }
}

#[tokio::test]
async fn failed_node_stops_downstream_dispatch() {
    let wf = linear_workflow(&["ok", "boom", "never"]);

    let handlers = vec![
        ("ok", MockHandler::returning("mock", json!({ "ok": true }))),
        ("boom", MockHandler::failing("mock", HandlerError::Internal("something broke".into()))),
        ("never", MockHandler::returning("mock", json!({ "should": "not run" }))),
    ];

    let (order, result) = run_linear(&wf, &handlers).await;

    assert_eq!(order, vec!["ok", "boom"]);
    assert!(matches!(result, Err(HandlerError::Internal(_))));

    let never = &handlers.iter().find(|(id, _)| *id == "never").unwrap().1;
    assert_eq!(never.call_count(), 0);
}

#[tokio::test]
async fn diamond_dag_exposes_both_branch_outputs_to_the_join_node() {
    //   a
    //  / \
    // b   c
    //  \ /
    //   d
    let nodes = vec![node("a"), node("b"), node("c"), node("d")];
    let edges = vec![Edge::new("a", "b"), Edge::new("a", "c"), Edge::new("b", "d"), Edge::new("c", "d")];
    let wf = Workflow::new("diamond", Trigger::Manual, nodes, edges);
    let plan = validate_dag(&wf).expect("valid dag");

    let handler_a = MockHandler::returning("mock", json!({ "from": "a" }));
    let handler_b = MockHandler::returning("mock", json!({ "from": "b" }));
    let handler_c = MockHandler::returning("mock", json!({ "from": "c" }));
    let handler_d = MockHandler::returning("mock", json!({ "from": "d" }));

    let mut previous_outputs = Vec::new();
    for node_id in &plan.order {
        let handler = match node_id.as_str() {
            "a" => &handler_a,
            "b" => &handler_b,
            "c" => &handler_c,
            "d" => &handler_d,
            other => panic!("unexpected node {other}"),
        };
        let ctx = make_ctx(&wf, previous_outputs.clone());
        let spec = nodes::NodeSpec { id: node_id.clone(), block_type: "mock".into(), config: Value::Null };
        let output = handler.execute(&spec, &ctx).await.expect("should succeed");
        previous_outputs.push((node_id.clone(), output));
    }

    // By the time "d" runs, both of its predecessors' outputs are visible
    // to it via `previous_outputs` — this is what `{NodeId.x}` resolution
    // in the template interpolator depends on.
    let seen: HashSet<&str> = previous_outputs.iter().map(|(id, _)| id.as_str()).collect();
    assert!(seen.contains("b"));
    assert!(seen.contains("c"));
    assert_eq!(plan.predecessors["d"].len(), 2);
}

#[tokio::test]
async fn duplicate_node_id_is_rejected_before_any_handler_runs() {
    let wf = Workflow::new("bad", Trigger::Manual, vec![node("a"), node("a")], vec![]);
    assert!(validate_dag(&wf).is_err());
}

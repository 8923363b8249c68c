//! DAG validation and scheduling metadata.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every edge must reference valid node IDs (both `source` and `target`).
//! 3. No edge may be a self-loop.
//! 4. The directed graph must be acyclic (topological sort must succeed).
//!
//! Ties in the topological sort are broken by each node's position in
//! `workflow.nodes`, so two graphs with the same node list always
//! produce the same order — a prerequisite for deterministic execution.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{models::Workflow, EngineError};

/// Scheduling metadata computed once per execution: a stable topological
/// order plus adjacency in both directions, keyed by node ID.
#[derive(Debug, Clone)]
pub struct DagPlan {
    /// Node IDs in a stable topological order.
    pub order: Vec<String>,
    /// `node_id -> direct predecessor node IDs`.
    pub predecessors: HashMap<String, Vec<String>>,
    /// `node_id -> direct successor node IDs`.
    pub successors: HashMap<String, Vec<String>>,
}

impl DagPlan {
    /// Nodes with no predecessors — the initial ready frontier.
    pub fn roots(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.predecessors.get(*id).map_or(true, |p| p.is_empty()))
            .cloned()
            .collect()
    }

    /// Nodes with no successors — candidates for "the final node's output".
    pub fn leaves(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.successors.get(*id).map_or(true, |s| s.is_empty()))
            .cloned()
            .collect()
    }
}

/// Validate the workflow's DAG and compute its scheduling plan.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
/// - [`EngineError::SelfLoop`] if an edge's `source` equals its `target`.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(workflow: &Workflow) -> Result<DagPlan, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique; record each node's list position.
    // -----------------------------------------------------------------------
    let mut position: HashMap<&str, usize> = HashMap::new();
    for (idx, node) in workflow.nodes.iter().enumerate() {
        if position.insert(node.id.as_str(), idx).is_some() {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    let node_set: HashSet<&str> = position.keys().copied().collect();

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints and reject self-loops.
    // -----------------------------------------------------------------------
    for edge in &workflow.edges {
        if !node_set.contains(edge.source.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.source.clone(),
                side: "source",
            });
        }
        if !node_set.contains(edge.target.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.target.clone(),
                side: "target",
            });
        }
        if edge.source == edge.target {
            return Err(EngineError::SelfLoop(edge.source.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 3. Build adjacency and in-degree.
    // -----------------------------------------------------------------------
    let mut successors: HashMap<String, Vec<String>> =
        workflow.nodes.iter().map(|n| (n.id.clone(), Vec::new())).collect();
    let mut predecessors: HashMap<String, Vec<String>> =
        workflow.nodes.iter().map(|n| (n.id.clone(), Vec::new())).collect();
    let mut in_degree: HashMap<&str, usize> = workflow.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();

    for edge in &workflow.edges {
        successors.get_mut(&edge.source).unwrap().push(edge.target.clone());
        predecessors.get_mut(&edge.target).unwrap().push(edge.source.clone());
        *in_degree.get_mut(edge.target.as_str()).unwrap() += 1;
    }

    // -----------------------------------------------------------------------
    // 4. Topological sort (Kahn's algorithm), ties broken by list position.
    // -----------------------------------------------------------------------
    // A `BTreeSet<(position, id)>` pops the lowest position first and stays
    // deterministic regardless of hash-map iteration order.
    let mut ready: BTreeSet<(usize, &str)> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| (position[id], id))
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some((_, node_id)) = ready.iter().next().copied() {
        ready.remove(&(position[node_id], node_id));
        order.push(node_id.to_owned());

        for successor in &successors[node_id] {
            let deg = in_degree.get_mut(successor.as_str()).unwrap();
            *deg -= 1;
            if *deg == 0 {
                ready.insert((position[successor.as_str()], successor.as_str()));
            }
        }
    }

    if order.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(DagPlan { order, predecessors, successors })
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, NodeDefinition, Trigger};
    use chrono::Utc;
    use uuid::Uuid;

    fn make_node(id: &str) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            block_type: "mock".into(),
            config: serde_json::Value::Null,
        }
    }

    fn make_workflow(nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: Uuid::new_v4(),
            name: "test".into(),
            trigger: Trigger::Manual,
            nodes,
            edges,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![Edge::new("a", "b"), Edge::new("b", "c")],
        );

        let plan = validate_dag(&workflow).expect("should be valid");
        assert_eq!(plan.order, vec!["a", "b", "c"]);
        assert_eq!(plan.roots(), vec!["a"]);
        assert_eq!(plan.leaves(), vec!["c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c"), make_node("d")],
            vec![
                Edge::new("a", "b"),
                Edge::new("a", "c"),
                Edge::new("b", "d"),
                Edge::new("c", "d"),
            ],
        );

        let plan = validate_dag(&workflow).expect("should be valid");
        assert_eq!(plan.order.first().unwrap(), "a");
        assert_eq!(plan.order.last().unwrap(), "d");
        assert_eq!(plan.order.len(), 4);
        assert_eq!(plan.predecessors["d"].len(), 2);
    }

    #[test]
    fn tie_break_uses_node_list_position() {
        // Two independent roots with no edges between them: "z" listed
        // before "a" must still sort "z" first.
        let workflow = make_workflow(vec![make_node("z"), make_node("a")], vec![]);
        let plan = validate_dag(&workflow).expect("should be valid");
        assert_eq!(plan.order, vec!["z", "a"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(vec![make_node("a")], vec![Edge::new("a", "ghost")]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn self_loop_is_rejected() {
        let workflow = make_workflow(vec![make_node("a")], vec![Edge::new("a", "a")]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::SelfLoop(id)) if id == "a"));
    }

    #[test]
    fn cycle_is_detected() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![Edge::new("a", "b"), Edge::new("b", "c"), Edge::new("c", "a")],
        );
        assert!(matches!(validate_dag(&workflow), Err(EngineError::CycleDetected)));
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let workflow = make_workflow(vec![make_node("solo")], vec![]);
        let plan = validate_dag(&workflow).expect("single node should be valid");
        assert_eq!(plan.order, vec!["solo"]);
    }
}

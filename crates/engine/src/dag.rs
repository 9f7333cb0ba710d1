//! Graph validation and topological ordering of a workflow's nodes.
//!
//! Execution does not use this by default: nodes run in stored order and
//! connections are descriptive. `ExecutionOrder::Topological` opts in.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every connection must reference valid node IDs (both ends).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Ties are broken by stored order, so a workflow without connections sorts
//! to exactly its stored order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{models::Workflow, EngineError};

/// Rules 1 and 2: unique node ids and connections between existing nodes.
///
/// # Errors
/// [`EngineError::DuplicateNodeId`] or [`EngineError::UnknownNodeReference`].
pub fn check_graph(workflow: &Workflow) -> Result<(), EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate connection endpoints
    // -----------------------------------------------------------------------
    for connection in &workflow.connections {
        if !seen_ids.contains(connection.source_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: connection.source_node_id.clone(),
                side: "source",
            });
        }
        if !seen_ids.contains(connection.target_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: connection.target_node_id.clone(),
                side: "target",
            });
        }
    }

    Ok(())
}

/// Validate the workflow's graph and return node ids in topological order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection references a missing node.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn topological_order(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    check_graph(workflow)?;

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = workflow
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0))
        .collect();

    for connection in &workflow.connections {
        adjacency
            .entry(connection.source_node_id.as_str())
            .or_default()
            .push(connection.target_node_id.as_str());
        *in_degree.entry(connection.target_node_id.as_str()).or_insert(0) += 1;
    }

    // Seed with nodes that have no incoming connections, in stored order.
    let mut queue: VecDeque<&str> = workflow
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, Position, WorkflowNode};
    use dsl::Trigger;
    use serde_json::Value;

    fn make_node(id: &str) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            template_id: "log".into(),
            name: id.to_string(),
            position: Position::default(),
            config: Value::Null,
            enabled: true,
        }
    }

    fn edge(from: &str, to: &str) -> Connection {
        Connection {
            id: format!("{from}->{to}"),
            source_node_id: from.into(),
            target_node_id: to.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    fn make_workflow(nodes: Vec<WorkflowNode>, connections: Vec<Connection>) -> Workflow {
        let mut wf = Workflow::new("test", Trigger::Manual);
        wf.nodes = nodes;
        wf.connections = connections;
        wf
    }

    #[test]
    fn linear_chain_sorts_along_connections() {
        // stored c, b, a but wired a → b → c
        let workflow = make_workflow(
            vec![make_node("c"), make_node("b"), make_node("a")],
            vec![edge("a", "b"), edge("b", "c")],
        );

        let sorted = topological_order(&workflow).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c"), make_node("d")],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );

        let sorted = topological_order(&workflow).expect("should be valid");
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn unconnected_nodes_keep_stored_order() {
        let workflow = make_workflow(vec![make_node("z"), make_node("y"), make_node("x")], vec![]);
        assert_eq!(topological_order(&workflow).unwrap(), vec!["z", "y", "x"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            topological_order(&workflow),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn connection_to_missing_node_is_rejected() {
        let workflow = make_workflow(vec![make_node("a")], vec![edge("a", "ghost")]);
        assert!(matches!(
            topological_order(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(topological_order(&workflow), Err(EngineError::CycleDetected)));
    }

    #[test]
    fn check_graph_accepts_cycles_but_not_broken_references() {
        let cyclic = make_workflow(vec![make_node("a"), make_node("b")], vec![edge("a", "b"), edge("b", "a")]);
        assert!(check_graph(&cyclic).is_ok());

        let dangling = make_workflow(vec![make_node("a")], vec![edge("ghost", "a")]);
        assert!(matches!(
            check_graph(&dangling),
            Err(EngineError::UnknownNodeReference { side: "source", .. })
        ));
    }
}

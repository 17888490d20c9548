use std::collections::{BTreeMap, BTreeSet};

use super::*;

/// Renders the graph reachable from `root` as Graphviz DOT.
pub fn render_dot(root: Value) -> String {
    let (nodes_ids, edges, id_node_map) = trace(root);

    let mut nodes_str = String::new();
    let mut edges_str = String::new();
    for node_id in nodes_ids {
        let node = id_node_map[&node_id];
        nodes_str += &format!(
            "    \"{}\" [label=\"{{ data {:.06} | grad {:.06} }}\" shape=record]\n",
            node_id,
            node.data(),
            node.grad(),
        );
        let op = node.op();
        if op != Op::Leaf {
            nodes_str += &format!("    \"{}{}\" [label=\"{}\"]\n", node_id, op, op);
            edges_str += &format!("    \"{}{}\" -> \"{}\"\n", node_id, op, node_id);
        }
    }

    for (n1, n2) in edges {
        let op = id_node_map[&n2].op();
        edges_str += &format!("    \"{}\" -> \"{}{}\"\n", n1, n2, op);
    }

    format!(
        "strict digraph {{\n    graph [rankdir=LR]\n\n{}{}}}",
        nodes_str, edges_str
    )
}

type Edge = (NodeId, NodeId);

fn trace(root: Value) -> (BTreeSet<NodeId>, BTreeSet<Edge>, BTreeMap<NodeId, Value>) {
    let mut nodes = BTreeSet::new();
    let mut edges = BTreeSet::new();
    let mut id_node_map = BTreeMap::new();
    build(root, &mut nodes, &mut edges, &mut id_node_map);
    (nodes, edges, id_node_map)
}

fn build<'g>(
    node: Value<'g>,
    nodes: &mut BTreeSet<NodeId>,
    edges: &mut BTreeSet<Edge>,
    id_node_map: &mut BTreeMap<NodeId, Value<'g>>,
) {
    let node_id = node.id();
    if nodes.insert(node_id) {
        id_node_map.insert(node_id, node);
        for child in node.inputs() {
            edges.insert((child.id(), node_id));
            build(child, nodes, edges, id_node_map);
        }
    }
}

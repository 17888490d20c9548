use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use log::debug;

use super::node::{Arena, Node, NodeId};
use super::op::Op;
use super::tape::Tape;
use super::ValueType;
use crate::error::{Error, Result};

/// Knobs of a [`Graph`]. The default applies no clipping.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GraphOptions {
    /// Clamp every accumulated gradient into `[-clip, clip]`.
    pub gradient_clip: Option<ValueType>,
}

/// A computation graph: the node arena plus the tape recording it.
///
/// Call [`Graph::clear`] once per training iteration, before building that
/// iteration's graph. The tape grows with every operation and is replayed in
/// full by [`Graph::backward`], so skipping the clear leaks memory and mixes
/// gradients of unrelated iterations. Parameters survive the clear.
///
/// A graph is single-threaded; give each thread its own.
pub struct Graph {
    arena: RefCell<Arena>,
    tape: RefCell<Tape>,
    options: GraphOptions,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_options(GraphOptions::default())
    }

    pub fn with_options(options: GraphOptions) -> Self {
        Self {
            arena: RefCell::new(Arena::new(options.gradient_clip)),
            tape: RefCell::new(Tape::default()),
            options,
        }
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    /// Number of clears that actually dropped something.
    pub fn epoch(&self) -> u64 {
        self.arena.borrow().epoch()
    }

    pub fn tape_len(&self) -> usize {
        self.tape.borrow().len()
    }

    pub fn node_count(&self) -> usize {
        self.arena.borrow().len()
    }

    /// Drops the tape and every non-parameter node.
    ///
    /// Idempotent. Handles to dropped nodes fail with [`Error::StaleNode`].
    pub fn clear(&self) {
        let entries = self.tape.borrow_mut().clear();
        let nodes = self.arena.borrow_mut().reset();
        if entries > 0 || nodes > 0 {
            debug!(
                "cleared graph: dropped {} tape entries and {} nodes, now at epoch {}",
                entries,
                nodes,
                self.epoch()
            );
        }
    }

    /// Resets the gradient of every live node to zero.
    pub fn zero_grad(&self) {
        self.arena.borrow_mut().zero_grad();
    }

    /// Seeds `root` with gradient 1 and replays the tape newest first.
    ///
    /// The tape must only hold the current computation; see [`Graph::clear`].
    pub fn backward(&self, root: NodeId) -> Result<()> {
        let mut arena = self.arena.borrow_mut();
        let tape = self.tape.borrow();
        debug!("backward from {}: replaying {} tape entries", root, tape.len());

        arena.get_mut(root)?.grad = 1.;
        tape.run_backward(&mut arena)
    }

    /// Same result as [`Graph::backward`] for the nodes reachable from
    /// `root`, but walks the input links in reverse topological order instead
    /// of replaying the whole tape.
    pub fn backward_topological(&self, root: NodeId) -> Result<()> {
        let mut arena = self.arena.borrow_mut();
        let tape = self.tape.borrow();
        let topo = build_topology(&arena, root)?;
        debug!("backward from {}: {} nodes in topological order", root, topo.len());

        let rules: HashMap<NodeId, usize> = tape
            .entries()
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.output, idx))
            .collect();

        arena.get_mut(root)?.grad = 1.;
        for id in topo.into_iter().rev() {
            if arena.get(id)?.op == Op::Leaf {
                continue;
            }
            let idx = *rules.get(&id).ok_or(Error::UnrecordedNode { id })?;
            tape.entries()[idx].propagate(&mut arena)?;
        }
        Ok(())
    }

    /// Snapshot of a node.
    pub fn node(&self, id: NodeId) -> Result<Node> {
        Ok(self.arena.borrow().get(id)?.clone())
    }

    pub fn data(&self, id: NodeId) -> Result<ValueType> {
        Ok(self.arena.borrow().get(id)?.data)
    }

    pub fn grad(&self, id: NodeId) -> Result<ValueType> {
        Ok(self.arena.borrow().get(id)?.grad)
    }

    /// Overwrites the value of a node without touching the graph.
    pub fn set_data(&self, id: NodeId, data: ValueType) -> Result<()> {
        self.arena.borrow_mut().get_mut(id)?.data = data;
        Ok(())
    }

    pub fn reset_grad(&self, id: NodeId) -> Result<()> {
        self.arena.borrow_mut().get_mut(id)?.grad = 0.;
        Ok(())
    }

    pub fn op(&self, id: NodeId) -> Result<Op> {
        Ok(self.arena.borrow().get(id)?.op)
    }

    pub fn inputs(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.arena.borrow().get(id)?.inputs.clone())
    }

    pub(crate) fn leaf(&self, data: ValueType) -> NodeId {
        self.arena.borrow_mut().push(Node::leaf(data))
    }

    pub(crate) fn parameter(&self, data: ValueType) -> NodeId {
        self.arena.borrow_mut().push_parameter(Node::leaf(data))
    }

    /// Computes `op` over `inputs`, stores the result and records its rule.
    pub(crate) fn apply(&self, op: Op, inputs: &[NodeId]) -> Result<NodeId> {
        if op == Op::Leaf || inputs.len() != op.arity() {
            return Err(Error::ShapeMismatch {
                operation: op.name(),
                expected: op.arity(),
                actual: inputs.len(),
            });
        }

        let out = {
            let mut arena = self.arena.borrow_mut();
            let operands = inputs
                .iter()
                .map(|&id| arena.get(id).map(Node::data))
                .collect::<Result<Vec<_>>>()?;
            arena.push(Node::new(op.forward(&operands), op, inputs.to_vec()))
        };
        self.tape
            .borrow_mut()
            .record(out, op.backward(out, inputs));

        Ok(out)
    }

    /// Replays the tape oldest first, the order `backward` must not use.
    #[cfg(test)]
    pub(crate) fn backward_oldest_first(&self, root: NodeId) -> Result<()> {
        let mut arena = self.arena.borrow_mut();
        arena.get_mut(root)?.grad = 1.;
        for entry in self.tape.borrow().entries() {
            entry.propagate(&mut arena)?;
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("epoch", &self.epoch())
            .field("nodes", &self.node_count())
            .field("tape_len", &self.tape_len())
            .field("options", &self.options)
            .finish()
    }
}

/// Nodes reachable from `root`, every node after all of its inputs.
fn build_topology(arena: &Arena, root: NodeId) -> Result<Vec<NodeId>> {
    let mut topo = vec![];
    let mut visited = HashSet::<NodeId>::new();

    build_topology_impl(arena, root, &mut topo, &mut visited)?;

    Ok(topo)
}

fn build_topology_impl(
    arena: &Arena,
    root: NodeId,
    topology: &mut Vec<NodeId>,
    visited: &mut HashSet<NodeId>,
) -> Result<()> {
    if visited.insert(root) {
        for &child in arena.get(root)?.inputs.iter() {
            build_topology_impl(arena, child, topology, visited)?;
        }
        topology.push(root);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Value;
    use float_eq::*;

    #[test]
    fn apply_checks_arity() {
        let graph = Graph::new();
        let a = graph.leaf(1.);

        assert_eq!(
            graph.apply(Op::Add, &[a]),
            Err(Error::ShapeMismatch {
                operation: "add",
                expected: 2,
                actual: 1
            })
        );
        assert!(graph.apply(Op::Leaf, &[]).is_err());
        assert_eq!(graph.tape_len(), 0);
    }

    #[test]
    fn every_operation_is_recorded_once() {
        let graph = Graph::new();
        let a = Value::new(&graph, 2.);
        let b = Value::new(&graph, 3.);
        let _ = (a * b + a).relu();

        assert_eq!(graph.tape_len(), 3);
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn clear_is_idempotent() {
        let graph = Graph::new();
        let a = Value::new(&graph, 2.);
        let _ = a * a;

        graph.clear();
        assert_eq!(graph.tape_len(), 0);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.epoch(), 1);

        graph.clear();
        assert_eq!(graph.tape_len(), 0);
        assert_eq!(graph.epoch(), 1);
    }

    #[test]
    fn backward_after_clear_touches_only_new_nodes() {
        let graph = Graph::new();
        let w = Value::parameter(&graph, 3.);
        let old = Value::new(&graph, 5.);
        let _ = w * old;

        graph.clear();
        let x = Value::new(&graph, 2.);
        let y = w + x;
        y.backward();

        assert_float_eq!(w.grad(), 1., abs <= 1e-10);
        assert_float_eq!(x.grad(), 1., abs <= 1e-10);
        assert_eq!(graph.tape_len(), 1);
    }

    #[test]
    fn stale_tape_leaks_gradient() {
        // Without the clear, the first iteration's entry is replayed again.
        let graph = Graph::new();
        let w = Value::parameter(&graph, 3.);

        let first = w * 2.;
        first.backward();
        assert_float_eq!(w.grad(), 2., abs <= 1e-10);

        w.reset_grad();
        let second = w + 1.;
        second.backward();
        assert_float_eq!(w.grad(), 1. + 2. * first.grad(), abs <= 1e-10);
        assert!(w.grad() != 1.);
    }

    #[test]
    fn stale_handles_fail_loudly() {
        let graph = Graph::new();
        let a = Value::new(&graph, 1.);
        let b = a + 1.;
        graph.clear();

        assert!(matches!(
            graph.backward(b.id()),
            Err(Error::StaleNode { node_epoch: 0, graph_epoch: 1, .. })
        ));
        assert!(graph.data(a.id()).is_err());
    }

    #[test]
    fn topological_backward_matches_tape_replay() {
        let graph = Graph::new();
        let x = Value::parameter(&graph, -4.);

        let build = || {
            let z = 2. * x + 2. + x;
            let q = z.relu() + z * x;
            let h = (z * z).relu();
            h + q + q * x
        };

        let y = build();
        graph.backward(y.id()).unwrap();
        let replayed = x.grad();

        graph.clear();
        x.reset_grad();
        let y = build();
        graph.backward_topological(y.id()).unwrap();

        assert_float_eq!(x.grad(), replayed, abs <= 1e-10);
        assert_float_eq!(x.grad(), 46., abs <= 1e-10);
    }

    #[test]
    fn topological_backward_skips_unrelated_entries() {
        let graph = Graph::new();
        let a = Value::new(&graph, 2.);
        let b = Value::new(&graph, 5.);
        let y = a * a;
        let unrelated = b * 3.;

        graph.backward_topological(y.id()).unwrap();

        assert_float_eq!(a.grad(), 4., abs <= 1e-10);
        assert_float_eq!(b.grad(), 0., abs <= 1e-10);
        assert_float_eq!(unrelated.grad(), 0., abs <= 1e-10);
    }

    #[test]
    fn consumers_run_before_their_inputs() {
        // a -> b = a * a -> c = b * b -> d = c + b, all of depth three.
        let graph = Graph::new();
        let a = Value::new(&graph, 2.);
        let b = a * a;
        let c = b * b;
        let d = c + b;

        d.backward();
        let reverse = a.grad();
        // dd/da = 4 a^3 + 2 a
        assert_float_eq!(reverse, 36., abs <= 1e-10);

        graph.zero_grad();
        graph.backward_oldest_first(d.id()).unwrap();
        assert!(a.grad() != reverse);
    }

    #[test]
    fn topological_backward_rejects_unrecorded_nodes() {
        let graph = Graph::new();
        let a = graph.leaf(1.);
        let b = graph.leaf(2.);
        let orphan = graph
            .arena
            .borrow_mut()
            .push(Node::new(3., Op::Add, vec![a, b]));

        assert_eq!(
            graph.backward_topological(orphan),
            Err(Error::UnrecordedNode { id: orphan })
        );
        // The tape driver has nothing to replay and leaves the inputs alone.
        graph.backward(orphan).unwrap();
        assert_float_eq!(graph.grad(a).unwrap(), 0., abs <= 1e-10);
    }

    #[test]
    fn node_snapshot() {
        let graph = Graph::new();
        let a = Value::new(&graph, 3.);
        let b = a.pow(2.);
        b.backward();

        let node = graph.node(b.id()).unwrap();
        assert_eq!(node.op(), Op::Pow(2.));
        assert_eq!(node.inputs(), &[a.id()]);
        assert_float_eq!(node.data(), 9., abs <= 1e-10);
        assert_float_eq!(node.grad(), 1., abs <= 1e-10);

        // A snapshot does not follow later updates.
        b.set_data(0.);
        assert_float_eq!(node.data(), 9., abs <= 1e-10);

        graph.clear();
        assert!(matches!(graph.node(b.id()), Err(Error::StaleNode { .. })));
    }

    #[test]
    fn gradient_clip_option() {
        let graph = Graph::with_options(GraphOptions {
            gradient_clip: Some(10.),
        });
        assert_eq!(graph.options().gradient_clip, Some(10.));
        assert_eq!(Graph::new().options(), GraphOptions::default());
        let a = Value::new(&graph, 64.);
        let b = Value::new(&graph, 8.);
        let c = a * b;
        c.backward();

        assert_float_eq!(a.grad(), 8., abs <= 1e-10);
        assert_float_eq!(b.grad(), 10., abs <= 1e-10);
    }

    #[test]
    fn debug_summary() {
        let graph = Graph::new();
        let _ = Value::new(&graph, 1.) + 1.;

        assert_eq!(
            format!("{:?}", graph),
            "Graph { epoch: 0, nodes: 3, tape_len: 1, options: GraphOptions { gradient_clip: None } }"
        );
    }
}

use log::warn;

use super::op::Op;
use super::ValueType;
use crate::error::{Error, Result};

/// Identity of a node inside a [`Graph`](super::Graph).
///
/// Parameters live for as long as the graph does. Scratch nodes carry the
/// epoch they were created in and stop resolving once the graph is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Parameter(usize),
    Scratch { epoch: u64, index: usize },
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeId::Parameter(index) => write!(f, "p{:08}", index),
            NodeId::Scratch { epoch, index } => write!(f, "e{}n{:08}", epoch, index),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub(crate) data: ValueType,
    pub(crate) grad: ValueType,
    pub(crate) op: Op,
    pub(crate) inputs: Vec<NodeId>,
}

impl Node {
    pub(crate) fn leaf(data: ValueType) -> Self {
        Self::new(data, Op::Leaf, vec![])
    }

    pub(crate) fn new(data: ValueType, op: Op, inputs: Vec<NodeId>) -> Self {
        Self {
            data,
            grad: 0.,
            op,
            inputs,
        }
    }

    pub fn data(&self) -> ValueType {
        self.data
    }

    pub fn grad(&self) -> ValueType {
        self.grad
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }
}

/// Storage for every node of a graph.
///
/// Split in two regions: parameters, which survive [`Arena::reset`], and
/// scratch nodes, which are dropped wholesale on every reset.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    epoch: u64,
    parameters: Vec<Node>,
    scratch: Vec<Node>,
    gradient_clip: Option<ValueType>,
}

impl Arena {
    pub(crate) fn new(gradient_clip: Option<ValueType>) -> Self {
        Self {
            gradient_clip,
            ..Default::default()
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn len(&self) -> usize {
        self.parameters.len() + self.scratch.len()
    }

    pub(crate) fn push_parameter(&mut self, node: Node) -> NodeId {
        self.parameters.push(node);
        NodeId::Parameter(self.parameters.len() - 1)
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.scratch.push(node);
        NodeId::Scratch {
            epoch: self.epoch,
            index: self.scratch.len() - 1,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&Node> {
        let node = match id {
            NodeId::Parameter(index) => self.parameters.get(index),
            NodeId::Scratch { epoch, index } => {
                self.check_epoch(id, epoch)?;
                self.scratch.get(index)
            }
        };
        node.ok_or(Error::UnknownNode { id })
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        let node = match id {
            NodeId::Parameter(index) => self.parameters.get_mut(index),
            NodeId::Scratch { epoch, index } => {
                self.check_epoch(id, epoch)?;
                self.scratch.get_mut(index)
            }
        };
        node.ok_or(Error::UnknownNode { id })
    }

    /// Adds `delta` into the gradient of `id`, clipping if the graph asks for it.
    pub(crate) fn accumulate(&mut self, id: NodeId, delta: ValueType) -> Result<()> {
        let clip = self.gradient_clip;
        let node = self.get_mut(id)?;
        node.grad += delta;

        if let Some(limit) = clip.map(ValueType::abs) {
            if node.grad.abs() > limit {
                warn!("clipping gradient of {} from {} to ±{}", id, node.grad, limit);
                node.grad = limit.copysign(node.grad);
            }
        }
        Ok(())
    }

    pub(crate) fn zero_grad(&mut self) {
        self.parameters
            .iter_mut()
            .chain(self.scratch.iter_mut())
            .for_each(|node| node.grad = 0.);
    }

    /// Drops every scratch node and returns how many were dropped.
    ///
    /// The epoch only advances when something was dropped, so resetting an
    /// already empty scratch region changes nothing.
    pub(crate) fn reset(&mut self) -> usize {
        let dropped = self.scratch.len();
        if dropped > 0 {
            self.scratch = Vec::new();
            self.epoch += 1;
        }
        dropped
    }

    fn check_epoch(&self, id: NodeId, node_epoch: u64) -> Result<()> {
        if node_epoch == self.epoch {
            Ok(())
        } else {
            Err(Error::StaleNode {
                id,
                node_epoch,
                graph_epoch: self.epoch,
            })
        }
    }
}

mod graph;
mod node;
mod op;
mod tape;
pub mod viz;


pub use graph::{Graph, GraphOptions};
pub use node::{Node, NodeId};
pub use op::Op;

use crate::error::{Error, Result};

pub type ValueType = f64;

/// Handle to a scalar node of a [`Graph`].
///
/// Handles are `Copy`; the graph owns the node. Operator misuse (mixing
/// graphs, using a handle after [`Graph::clear`] dropped its node) panics at
/// the call site. The fallible equivalents live on [`Graph`].
#[derive(Clone, Copy, Debug)]
pub struct Value<'g> {
    graph: &'g Graph,
    id: NodeId,
}

impl<'g> Value<'g> {
    /// A leaf that lives until the next [`Graph::clear`].
    pub fn new(graph: &'g Graph, data: ValueType) -> Self {
        Self {
            graph,
            id: graph.leaf(data),
        }
    }

    /// A leaf that survives [`Graph::clear`], for model weights.
    pub fn parameter(graph: &'g Graph, data: ValueType) -> Self {
        Self {
            graph,
            id: graph.parameter(data),
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn data(&self) -> ValueType {
        resolve(self.graph.data(self.id))
    }

    pub fn grad(&self) -> ValueType {
        resolve(self.graph.grad(self.id))
    }

    pub fn set_data(&self, data: ValueType) {
        resolve(self.graph.set_data(self.id, data))
    }

    pub fn reset_grad(&self) {
        resolve(self.graph.reset_grad(self.id))
    }

    pub fn op(&self) -> Op {
        resolve(self.graph.op(self.id))
    }

    pub fn inputs(&self) -> Vec<Value<'g>> {
        resolve(self.graph.inputs(self.id))
            .into_iter()
            .map(|id| Value {
                graph: self.graph,
                id,
            })
            .collect()
    }

    pub fn relu(&self) -> Value<'g> {
        self.apply(Op::Relu, &[self.id])
    }

    pub fn tanh(&self) -> Value<'g> {
        self.apply(Op::Tanh, &[self.id])
    }

    pub fn sigmoid(&self) -> Value<'g> {
        self.apply(Op::Sigmoid, &[self.id])
    }

    pub fn pow(&self, exp: ValueType) -> Value<'g> {
        self.apply(Op::Pow(exp), &[self.id])
    }

    /// Backpropagates from this node by replaying the graph's tape.
    ///
    /// Clear the graph before building each independent computation, or
    /// entries left over from the previous one are replayed too.
    pub fn backward(&self) {
        resolve(self.graph.backward(self.id))
    }

    fn constant(&self, data: ValueType) -> Value<'g> {
        Value::new(self.graph, data)
    }

    fn binary(&self, op: Op, rhs: Value<'g>) -> Value<'g> {
        if !std::ptr::eq(self.graph, rhs.graph) {
            panic!("{}", Error::ForeignGraph { op: op.name() });
        }
        self.apply(op, &[self.id, rhs.id])
    }

    fn apply(&self, op: Op, inputs: &[NodeId]) -> Value<'g> {
        Value {
            graph: self.graph,
            id: resolve(self.graph.apply(op, inputs)),
        }
    }
}

fn resolve<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{}", err),
    }
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph) && self.id == other.id
    }
}

impl Eq for Value<'_> {}

impl std::hash::Hash for Value<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl std::fmt::Display for Value<'_> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let args = self.inputs();
        match args.as_slice() {
            [] => {
                fmt.write_fmt(format_args!(
                    "Value({:.06}, grad={:.06})",
                    self.data(),
                    self.grad()
                ))?;
            }
            [arg] => {
                fmt.write_fmt(format_args!(
                    "{} [Value({:.06}, grad={:.06})]",
                    self.op(),
                    arg.data(),
                    arg.grad(),
                ))?;
            }
            [lhs, rhs] => {
                fmt.write_fmt(format_args!(
                    "[Value({:.06}, grad={:.06})] {} [Value({:.06}, grad={:.06})]",
                    lhs.data(),
                    lhs.grad(),
                    self.op(),
                    rhs.data(),
                    rhs.grad(),
                ))?;
            }
            _ => unreachable!("at most two inputs"),
        }
        Ok(())
    }
}

impl<'g> std::ops::Add for Value<'g> {
    type Output = Value<'g>;

    fn add(self, rhs: Value<'g>) -> Self::Output {
        self.binary(Op::Add, rhs)
    }
}

impl<'g> std::ops::Add<Value<'g>> for ValueType {
    type Output = Value<'g>;

    fn add(self, rhs: Value<'g>) -> Self::Output {
        rhs.constant(self) + rhs
    }
}

impl<'g> std::ops::Add<ValueType> for Value<'g> {
    type Output = Value<'g>;

    fn add(self, rhs: ValueType) -> Self::Output {
        self + self.constant(rhs)
    }
}

impl<'g> std::ops::Sub for Value<'g> {
    type Output = Value<'g>;

    fn sub(self, rhs: Value<'g>) -> Self::Output {
        self.binary(Op::Sub, rhs)
    }
}

impl<'g> std::ops::Sub<Value<'g>> for ValueType {
    type Output = Value<'g>;

    fn sub(self, rhs: Value<'g>) -> Self::Output {
        rhs.constant(self) - rhs
    }
}

impl<'g> std::ops::Sub<ValueType> for Value<'g> {
    type Output = Value<'g>;

    fn sub(self, rhs: ValueType) -> Self::Output {
        self - self.constant(rhs)
    }
}

impl<'g> std::ops::Mul for Value<'g> {
    type Output = Value<'g>;

    fn mul(self, rhs: Value<'g>) -> Self::Output {
        self.binary(Op::Mul, rhs)
    }
}

impl<'g> std::ops::Mul<Value<'g>> for ValueType {
    type Output = Value<'g>;

    fn mul(self, rhs: Value<'g>) -> Self::Output {
        rhs.constant(self) * rhs
    }
}

impl<'g> std::ops::Mul<ValueType> for Value<'g> {
    type Output = Value<'g>;

    fn mul(self, rhs: ValueType) -> Self::Output {
        self * self.constant(rhs)
    }
}

impl<'g> std::ops::Neg for Value<'g> {
    type Output = Value<'g>;

    fn neg(self) -> Self::Output {
        self.constant(-1.0) * self
    }
}

/// `a / b` is recorded as `a * b^-1`: one extra node and tape entry.
impl<'g> std::ops::Div for Value<'g> {
    type Output = Value<'g>;

    fn div(self, rhs: Value<'g>) -> Self::Output {
        self * rhs.pow(-1.)
    }
}

impl<'g> std::ops::Div<Value<'g>> for ValueType {
    type Output = Value<'g>;

    fn div(self, rhs: Value<'g>) -> Self::Output {
        let lhs = rhs.constant(self);

        lhs / rhs
    }
}

impl<'g> std::ops::Div<ValueType> for Value<'g> {
    type Output = Value<'g>;

    fn div(self, rhs: ValueType) -> Self::Output {
        self * rhs.powi(-1)
    }
}

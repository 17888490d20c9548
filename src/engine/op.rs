use super::node::{Arena, NodeId};
use super::tape::BackwardFn;
use super::ValueType;

/// Operation that produced a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Op {
    Leaf,
    Add,
    Sub,
    Mul,
    /// Power with a constant exponent.
    Pow(ValueType),
    Tanh,
    Relu,
    Sigmoid,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Leaf => "leaf",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Pow(_) => "pow",
            Op::Tanh => "tanh",
            Op::Relu => "relu",
            Op::Sigmoid => "sigmoid",
        }
    }

    pub(crate) fn arity(&self) -> usize {
        match self {
            Op::Leaf => 0,
            Op::Add | Op::Sub | Op::Mul => 2,
            Op::Pow(_) | Op::Tanh | Op::Relu | Op::Sigmoid => 1,
        }
    }

    pub(crate) fn forward(&self, x: &[ValueType]) -> ValueType {
        match self {
            Op::Leaf => x[0],
            Op::Add => x[0] + x[1],
            Op::Sub => x[0] - x[1],
            Op::Mul => x[0] * x[1],
            Op::Pow(exp) => x[0].powf(*exp),
            Op::Tanh => {
                let e = (2. * x[0]).exp();
                (e - 1.) / (e + 1.)
            }
            Op::Relu => {
                if x[0] < 0. {
                    0.
                } else {
                    x[0]
                }
            }
            Op::Sigmoid => {
                let e = x[0].exp();
                e / (1. + e)
            }
        }
    }

    /// Builds the rule that pushes the gradient of `out` into `inputs`.
    ///
    /// Operand data is read when the rule runs, not when it is built.
    pub(crate) fn backward(&self, out: NodeId, inputs: &[NodeId]) -> Option<BackwardFn> {
        let rule: BackwardFn = match (*self, inputs) {
            (Op::Leaf, _) => return None,
            (Op::Add, &[a, b]) => Box::new(move |arena: &mut Arena| {
                let g = arena.get(out)?.grad;
                arena.accumulate(a, g)?;
                arena.accumulate(b, g)
            }),
            (Op::Sub, &[a, b]) => Box::new(move |arena: &mut Arena| {
                let g = arena.get(out)?.grad;
                arena.accumulate(a, g)?;
                arena.accumulate(b, -g)
            }),
            (Op::Mul, &[a, b]) => Box::new(move |arena: &mut Arena| {
                let g = arena.get(out)?.grad;
                let (a_data, b_data) = (arena.get(a)?.data, arena.get(b)?.data);
                arena.accumulate(a, b_data * g)?;
                arena.accumulate(b, a_data * g)
            }),
            (Op::Pow(exp), &[a]) => Box::new(move |arena: &mut Arena| {
                let g = arena.get(out)?.grad;
                let base = arena.get(a)?.data;
                arena.accumulate(a, exp * base.powf(exp - 1.) * g)
            }),
            (Op::Tanh, &[a]) => Box::new(move |arena: &mut Arena| {
                let node = arena.get(out)?;
                let (t, g) = (node.data, node.grad);
                arena.accumulate(a, (1. - t * t) * g)
            }),
            (Op::Relu, &[a]) => Box::new(move |arena: &mut Arena| {
                let node = arena.get(out)?;
                let delta = if node.data > 0. { node.grad } else { 0. };
                arena.accumulate(a, delta)
            }),
            (Op::Sigmoid, &[a]) => Box::new(move |arena: &mut Arena| {
                let node = arena.get(out)?;
                let (t, g) = (node.data, node.grad);
                arena.accumulate(a, t * (1. - t) * g)
            }),
            (op, inputs) => unreachable!(
                "{} takes {} inputs, got {}; arity is checked in Graph::apply",
                op.name(),
                op.arity(),
                inputs.len()
            ),
        };
        Some(rule)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Leaf => Ok(()),
            Op::Add => f.write_str("+"),
            Op::Sub => f.write_str("-"),
            Op::Mul => f.write_str("*"),
            Op::Pow(exp) => write!(f, "^{}", exp),
            Op::Tanh => f.write_str("tanh"),
            Op::Relu => f.write_str("ReLU"),
            Op::Sigmoid => f.write_str("sigmoid"),
        }
    }
}

use crate::engine::*;
use crate::error::{Error, Result};
use itertools::Itertools;
use log::debug;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::iter::zip;

pub trait Module<'g> {
    fn zero_grad(&self) {
        self.parameters().iter().for_each(|v| v.reset_grad())
    }

    fn parameters(&self) -> Vec<Value<'g>>;

    /// Plain gradient descent step, applied directly to parameter values.
    fn update(&self, learning_rate: ValueType) {
        let params = self.parameters();
        debug!(
            "updating {} parameters with learning rate {}",
            params.len(),
            learning_rate
        );
        for p in params {
            p.set_data(p.data() - learning_rate * p.grad());
        }
    }
}

/// Element-wise non-linearity applied at the output of a neuron.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    pub fn apply<'g>(self, x: Value<'g>) -> Value<'g> {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.relu(),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => x.sigmoid(),
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Activation::Linear => "Linear",
            Activation::Relu => "ReLU",
            Activation::Tanh => "Tanh",
            Activation::Sigmoid => "Sigmoid",
        })
    }
}

pub struct Neuron<'g> {
    w: Vec<Value<'g>>,
    b: Value<'g>,
    activation: Activation,
}

impl<'g> Neuron<'g> {
    pub fn new(graph: &'g Graph, rng: &mut StdRng, nin: usize, activation: Activation) -> Self {
        let w = (0..nin)
            .map(|_| rng.gen_range(-1.0..1.0))
            .map(|data| Value::parameter(graph, data))
            .collect();
        Self {
            w,
            b: Value::parameter(graph, Default::default()),
            activation,
        }
    }

    pub fn run(&self, x: &[Value<'g>]) -> Result<Value<'g>> {
        if x.len() != self.w.len() {
            return Err(Error::ShapeMismatch {
                operation: "Neuron::run",
                expected: self.w.len(),
                actual: x.len(),
            });
        }

        let sum = zip(&self.w, x)
            .map(|(wi, xi)| *wi * *xi)
            .reduce(|v1, v2| v1 + v2);

        let sum = match sum {
            Some(sum) => sum + self.b,
            None => self.b,
        };

        Ok(self.activation.apply(sum))
    }
}

impl<'g> Module<'g> for Neuron<'g> {
    fn parameters(&self) -> Vec<Value<'g>> {
        let mut params = self.w.clone();
        params.push(self.b);

        params
    }
}

impl std::fmt::Display for Neuron<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}Neuron({})", self.activation, self.w.len()))?;

        Ok(())
    }
}

pub struct Layer<'g> {
    neurons: Vec<Neuron<'g>>,
}

impl<'g> Layer<'g> {
    pub fn new(
        graph: &'g Graph,
        rng: &mut StdRng,
        nin: usize,
        nout: usize,
        activation: Activation,
    ) -> Self {
        let neurons = (0..nout)
            .map(|_| Neuron::new(graph, rng, nin, activation))
            .collect();

        Self { neurons }
    }

    pub fn run(&self, x: &[Value<'g>]) -> Result<Vec<Value<'g>>> {
        self.neurons.iter().map(|n| n.run(x)).collect()
    }
}

impl<'g> Module<'g> for Layer<'g> {
    fn parameters(&self) -> Vec<Value<'g>> {
        self.neurons.iter().flat_map(|x| x.parameters()).collect()
    }
}

impl std::fmt::Display for Layer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Layer of [{}]", self.neurons.iter().join(", ")))?;

        Ok(())
    }
}

/// Layers run one after the other, each with its own activation.
pub struct Sequential<'g> {
    layers: Vec<Layer<'g>>,
}

impl<'g> Sequential<'g> {
    pub fn new(layers: Vec<Layer<'g>>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Layer<'g>] {
        &self.layers
    }

    pub fn run(&self, x: &[Value<'g>]) -> Result<Vec<Value<'g>>> {
        let mut x = x.to_vec();
        for layer in &self.layers {
            x = layer.run(&x)?;
        }

        Ok(x)
    }
}

impl<'g> Module<'g> for Sequential<'g> {
    fn parameters(&self) -> Vec<Value<'g>> {
        self.layers.iter().flat_map(|x| x.parameters()).collect()
    }
}

impl std::fmt::Display for Sequential<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Sequential of [{}]", self.layers.iter().join(", ")))?;

        Ok(())
    }
}

/// Feed-forward network. Hidden layers use `activation`, the last is linear.
pub struct MLP<'g> {
    net: Sequential<'g>,
}

impl<'g> MLP<'g> {
    pub fn new(
        graph: &'g Graph,
        rng: &mut StdRng,
        nin: usize,
        nouts: &[usize],
        activation: Activation,
    ) -> Self {
        let mut ls = vec![nin];
        ls.extend_from_slice(nouts);

        let layers = (0..nouts.len())
            .map(|n| {
                let activation = if n + 1 == nouts.len() {
                    Activation::Linear
                } else {
                    activation
                };
                Layer::new(graph, rng, ls[n], ls[n + 1], activation)
            })
            .collect();

        Self {
            net: Sequential::new(layers),
        }
    }

    pub fn run(&self, x: &[Value<'g>]) -> Result<Vec<Value<'g>>> {
        self.net.run(x)
    }
}

impl<'g> Module<'g> for MLP<'g> {
    fn parameters(&self) -> Vec<Value<'g>> {
        self.net.parameters()
    }
}

impl std::fmt::Display for MLP<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("MLP of [{}]", self.net.layers().iter().join(", ")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn neuron_weights_are_uniform_and_bias_is_zero() {
        let graph = Graph::new();
        let neuron = Neuron::new(&graph, &mut rng(), 16, Activation::Relu);
        let params = neuron.parameters();

        assert_eq!(params.len(), 17);
        assert!(params[..16].iter().all(|w| (-1.0..1.0).contains(&w.data())));
        assert_eq!(params[16].data(), 0.0);
    }

    #[test]
    fn neuron_computes_weighted_sum() {
        let graph = Graph::new();
        let neuron = Neuron::new(&graph, &mut rng(), 2, Activation::Linear);
        let params = neuron.parameters();
        let (w0, w1, b) = (params[0], params[1], params[2]);
        b.set_data(0.5);

        let x = [Value::new(&graph, 2.0), Value::new(&graph, -1.0)];
        let y = neuron.run(&x).unwrap();
        y.backward();

        assert_float_eq!(y.data(), 2.0 * w0.data() - w1.data() + 0.5, abs <= 1e-10);
        assert_float_eq!(w0.grad(), 2.0, abs <= 1e-10);
        assert_float_eq!(w1.grad(), -1.0, abs <= 1e-10);
        assert_float_eq!(b.grad(), 1.0, abs <= 1e-10);
        assert_float_eq!(x[0].grad(), w0.data(), abs <= 1e-10);
    }

    #[test]
    fn neuron_rejects_mismatched_inputs() {
        let graph = Graph::new();
        let neuron = Neuron::new(&graph, &mut rng(), 3, Activation::Tanh);
        let x = [Value::new(&graph, 1.0)];

        assert_eq!(
            neuron.run(&x).map(|v| v.id()),
            Err(Error::ShapeMismatch {
                operation: "Neuron::run",
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn activations_dispatch() {
        let graph = Graph::new();
        let x = Value::new(&graph, -0.5);

        assert_eq!(Activation::Linear.apply(x), x);
        assert_eq!(Activation::Relu.apply(x).op(), Op::Relu);
        assert_eq!(Activation::Tanh.apply(x).op(), Op::Tanh);
        assert_eq!(Activation::Sigmoid.apply(x).op(), Op::Sigmoid);
    }

    #[test]
    fn mlp_shape_and_display() {
        let graph = Graph::new();
        let mlp = MLP::new(&graph, &mut rng(), 3, &[4, 4, 1], Activation::Relu);

        assert_eq!(mlp.parameters().len(), 4 * 4 + 4 * 5 + 5);
        assert_eq!(
            mlp.to_string(),
            "MLP of [Layer of [ReLUNeuron(3), ReLUNeuron(3), ReLUNeuron(3), ReLUNeuron(3)], \
             Layer of [ReLUNeuron(4), ReLUNeuron(4), ReLUNeuron(4), ReLUNeuron(4)], \
             Layer of [LinearNeuron(4)]]"
        );

        let x = [1.0, -2.0, 0.5].map(|d| Value::new(&graph, d));
        assert_eq!(mlp.run(&x).unwrap().len(), 1);
    }

    #[test]
    fn sequential_keeps_per_layer_activations() {
        let graph = Graph::new();
        let mut rng = rng();
        let net = Sequential::new(vec![
            Layer::new(&graph, &mut rng, 2, 3, Activation::Relu),
            Layer::new(&graph, &mut rng, 3, 1, Activation::Tanh),
        ]);

        assert_eq!(net.parameters().len(), 3 * 3 + 4);
        assert_eq!(
            net.to_string(),
            "Sequential of [Layer of [ReLUNeuron(2), ReLUNeuron(2), ReLUNeuron(2)], \
             Layer of [TanhNeuron(3)]]"
        );

        let x = [0.5, -1.5].map(|d| Value::new(&graph, d));
        let y = net.run(&x).unwrap();
        assert_eq!(y.len(), 1);
        assert_eq!(y[0].op(), Op::Tanh);
        assert!(y[0].data().abs() < 1.0);

        let short = [Value::new(&graph, 1.0)];
        assert!(matches!(
            net.run(&short),
            Err(Error::ShapeMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn update_and_zero_grad() {
        let graph = Graph::new();
        let layer = Layer::new(&graph, &mut rng(), 1, 1, Activation::Linear);
        let params = layer.parameters();
        let (w, b) = (params[0], params[1]);
        let before = w.data();

        let y = layer.run(&[Value::new(&graph, 3.0)]).unwrap();
        y[0].backward();
        layer.update(0.1);

        assert_float_eq!(w.data(), before - 0.3, abs <= 1e-10);
        assert_float_eq!(b.data(), -0.1, abs <= 1e-10);

        layer.zero_grad();
        assert!(layer.parameters().iter().all(|p| p.grad() == 0.0));
    }
}

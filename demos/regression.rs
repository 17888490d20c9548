//! Fits a small MLP to `y = x0 + x1 + x2`.
//!
//! Run with `RUST_LOG=debug` to see each clear, backward and update.

extern crate tapegrad;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tapegrad::engine::*;
use tapegrad::loss::squared_error;
use tapegrad::nn::{Activation, Module, MLP};

struct TrainConfig {
    epochs: usize,
    learning_rate: ValueType,
    seed: u64,
}

const CONFIG: TrainConfig = TrainConfig {
    epochs: 200,
    learning_rate: 0.01,
    seed: 7,
};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let xs = [
        [0.2, 0.3, -1.0],
        [0.4, 0.3, 0.1],
        [0.5, 0.1, -0.1],
        [1.0, 1.0, -1.0],
    ];
    let ys = [-0.5, 0.8, 0.5, 1.0];

    let graph = Graph::new();
    let mut rng = StdRng::seed_from_u64(CONFIG.seed);
    let mlp = MLP::new(&graph, &mut rng, 3, &[4, 4, 1], Activation::Tanh);
    info!("training {}", mlp);

    for epoch in 0..CONFIG.epochs {
        // One clear per iteration: drops last iteration's tape and nodes.
        graph.clear();

        let mut preds = Vec::with_capacity(xs.len());
        for x in &xs {
            let x = x.map(|d| Value::new(&graph, d));
            preds.extend(mlp.run(&x)?);
        }
        let targets = ys.map(|d| Value::new(&graph, d));
        let loss = squared_error(&targets, &preds)?;

        mlp.zero_grad();
        graph.backward(loss.id())?;
        mlp.update(CONFIG.learning_rate);

        if epoch % 20 == 0 || epoch + 1 == CONFIG.epochs {
            println!("epoch {:>4}  loss {:.6}  tape {}", epoch, loss.data(), graph.tape_len());
        }
    }

    Ok(())
}

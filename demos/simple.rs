extern crate tapegrad;

use tapegrad::engine::viz::render_dot;
use tapegrad::engine::*;

fn main() {
    let graph = Graph::new();
    let x = Value::new(&graph, -4.0);
    let z = 2. * x + 2. + x;
    let q = z.relu() + z * x;
    let h = (z * z).relu();
    let y = h + q + q * x;
    y.backward();

    let dot = render_dot(y);
    println!("{dot}");
}

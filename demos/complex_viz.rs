extern crate tapegrad;

use tapegrad::engine::*;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let graph = Graph::new();
    let a = Value::new(&graph, -4.0);
    let b = Value::new(&graph, 2.0);
    let mut c = a + b;
    let mut d = a * b + b.pow(3.);
    c = c + (c + 1.);
    c = c + (1. + c + (-a));
    d = d + (d * 2. + (b + a).relu());
    d = d + (3. * d + (b - a).relu());
    let e = c - d;
    let f = e.pow(2.);
    let mut g = f / 2.0;
    g = g + (10.0 / f);
    graph.backward(g.id())?;

    let dot = viz::render_dot(g);
    println!("{dot}");

    Ok(())
}

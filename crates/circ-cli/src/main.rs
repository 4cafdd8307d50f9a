//! circ-cli: Command line demo for the circuitflow engine.
//!
//! Builds a small circuit (an oscillator driving an AND gate guarded by an
//! external enable input), runs it for a few seconds and prints what the
//! output block receives. For a richer demo see the `main-core` binary in
//! the workspace root.

use std::time::Duration;

use circ_blocks::{interval_timer, And, OutputFunc, ValueInput};
use circ_core::{konst, Circuit, CombBlockBuilder, EventSpec, Producer, SeqBlockBuilder, Simulation};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("circuitflow demo circuit");
    println!("========================");

    let circuit = Circuit::named("demo");

    SeqBlockBuilder::new("enable", ValueInput::new()).initdef(true)
                                                     .register(&circuit)?;

    SeqBlockBuilder::new("osc", interval_timer(false, Duration::from_millis(500), Duration::from_millis(500))?)
        .register(&circuit)?;

    CombBlockBuilder::new("gate", And).group("in", vec![Producer::from("osc"), Producer::from("enable"), konst(true)])
                                      .on_output(EventSpec::new("printer", "put"))
                                      .register(&circuit)?;

    SeqBlockBuilder::new("printer", OutputFunc::new(|value| {
                             println!("gate -> {value}");
                             Ok(())
                         })).register(&circuit)?;

    let sim = Simulation::start(circuit)?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    sim.shutdown().await?;
    println!("done");
    Ok(())
}

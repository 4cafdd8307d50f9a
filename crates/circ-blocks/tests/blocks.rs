//! Block library behavior, exercised through the engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use circ_blocks::{And, AsyncOutput, Compare, Counter, Or, OutputDriver, ValueInput, Xor};
use circ_core::{event_data, konst, Circuit, CircuitError, CombBlockBuilder, Producer, SeqBlockBuilder, Simulation};
use serde_json::{json, Value};

fn gate_circuit() -> Circuit {
    let circuit = Circuit::named("gates");
    SeqBlockBuilder::new("a", ValueInput::new()).initdef(false).register(&circuit).unwrap();
    SeqBlockBuilder::new("b", ValueInput::new()).initdef(true).register(&circuit).unwrap();
    CombBlockBuilder::new("and", And).group("in", vec![Producer::from("a"), Producer::from("b")])
                                     .register(&circuit)
                                     .unwrap();
    CombBlockBuilder::new("or", Or).group("in", vec![Producer::from("a"), Producer::from("b")])
                                   .register(&circuit)
                                   .unwrap();
    CombBlockBuilder::new("xor", Xor).group("in", vec![Producer::from("a"), Producer::from("b"), konst(false)])
                                     .register(&circuit)
                                     .unwrap();
    circuit
}

#[tokio::test]
async fn gates_follow_their_truth_tables() {
    let circuit = gate_circuit();
    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();

    // a=false, b=true
    assert_eq!(circuit.output("and").unwrap(), Some(json!(false)));
    assert_eq!(circuit.output("or").unwrap(), Some(json!(true)));
    assert_eq!(circuit.output("xor").unwrap(), Some(json!(true)));

    sim.handle().send("a", "put", event_data! { "value" => true }).await.unwrap();
    assert_eq!(circuit.output("and").unwrap(), Some(json!(true)));
    assert_eq!(circuit.output("xor").unwrap(), Some(json!(false)));

    sim.handle().send("b", "put", event_data! { "value" => false }).await.unwrap();
    assert_eq!(circuit.output("and").unwrap(), Some(json!(false)));
    assert_eq!(circuit.output("or").unwrap(), Some(json!(true)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn compare_applies_its_threshold() {
    let circuit = Circuit::named("compare");
    SeqBlockBuilder::new("level", ValueInput::new()).initdef(0).register(&circuit).unwrap();
    CombBlockBuilder::new("high", Compare::new(50.0)).input("in", "level")
                                                     .register(&circuit)
                                                     .unwrap();
    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    assert_eq!(circuit.output("high").unwrap(), Some(json!(false)));

    sim.handle().send("level", "put", event_data! { "value" => 50 }).await.unwrap();
    assert_eq!(circuit.output("high").unwrap(), Some(json!(true)));
    sim.handle().send("level", "put", event_data! { "value" => 49.9 }).await.unwrap();
    assert_eq!(circuit.output("high").unwrap(), Some(json!(false)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn counter_event_repertoire() {
    let circuit = Circuit::named("counter");
    SeqBlockBuilder::new("c", Counter::starting_at(10)).register(&circuit).unwrap();
    let sim = Simulation::start(circuit.clone()).unwrap();

    sim.handle().send("c", "inc", event_data! { "amount" => 5 }).await.unwrap();
    assert_eq!(circuit.output("c").unwrap(), Some(json!(15)));
    sim.handle().send("c", "dec", circ_core::EventData::new()).await.unwrap();
    assert_eq!(circuit.output("c").unwrap(), Some(json!(14)));
    sim.handle().send("c", "put", event_data! { "value" => -3 }).await.unwrap();
    assert_eq!(circuit.output("c").unwrap(), Some(json!(-3)));
    sim.handle().send("c", "reset", circ_core::EventData::new()).await.unwrap();
    assert_eq!(circuit.output("c").unwrap(), Some(json!(10)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn value_input_validator_rejects_bad_values() {
    let circuit = Circuit::named("input");
    SeqBlockBuilder::new("v", ValueInput::with_validator(|v| v.as_i64().map(|n| n >= 0).unwrap_or(false)))
        .initdef(0)
        .register(&circuit)
        .unwrap();
    let sim = Simulation::start(circuit.clone()).unwrap();

    assert_eq!(sim.handle().send("v", "put", event_data! { "value" => 9 }).await.unwrap(),
               json!(true));
    assert_eq!(sim.handle().send("v", "put", event_data! { "value" => -1 }).await.unwrap(),
               json!(false));
    // The rejected value did not reach the output.
    assert_eq!(circuit.output("v").unwrap(), Some(json!(9)));
    sim.shutdown().await.unwrap();
}

#[derive(Clone, Default)]
struct MemoryDriver {
    written: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl OutputDriver for MemoryDriver {
    async fn write(&self, value: Value) -> Result<(), CircuitError> {
        self.written.lock().unwrap().push(value);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn async_output_drains_its_queue_on_shutdown() {
    let driver = MemoryDriver::default();
    let written = Arc::clone(&driver.written);

    let circuit = Circuit::named("async-out");
    let out = AsyncOutput::new(driver, Duration::from_millis(10), Duration::from_secs(5)).unwrap();
    let stop_timeout = out.stop_timeout();
    SeqBlockBuilder::new("out", out).stop_timeout(stop_timeout)
                                    .register(&circuit)
                                    .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().send("out", "put", event_data! { "value" => "first" }).await.unwrap();
    sim.handle().send("out", "put", event_data! { "value" => "second" }).await.unwrap();
    sim.shutdown().await.unwrap();

    let seen = written.lock().unwrap().clone();
    assert_eq!(seen, vec![json!("first"), json!("second")]);
}

#[test]
fn guard_time_must_fit_in_the_stop_timeout() {
    let result = AsyncOutput::new(MemoryDriver::default(),
                                  Duration::from_secs(10),
                                  Duration::from_secs(5));
    assert!(matches!(result, Err(CircuitError::InvalidState(_))));
}

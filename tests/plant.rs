//! End-to-end test of the demo plant wiring.

use std::time::Duration;

use circ_core::{event_data, Circuit, Simulation};
use circuitflow_rust::demo::build_plant;
use serde_json::json;

async fn settle(sim: &Simulation) {
    sim.handle().checkpoint().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn pump_cycle_with_cooldown() {
    let circuit = Circuit::named("plant-test");
    build_plant(&circuit, 70.0).unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    settle(&sim).await;

    // Initial level 0: pump idle, no starts yet.
    assert_eq!(circuit.output("pump").unwrap(), Some(json!(false)));
    assert_eq!(circuit.output("starts").unwrap(), Some(json!(0)));

    // Level rises past the threshold: the comparator fires `start`.
    sim.handle().send("level", "put", event_data! { "value" => 85.0 }).await.unwrap();
    assert_eq!(circuit.output("high").unwrap(), Some(json!(true)));
    assert_eq!(circuit.output("pump").unwrap(), Some(json!(true)));
    assert_eq!(circuit.output("starts").unwrap(), Some(json!(1)));
    // The monitor block received the running notification.
    assert_eq!(circuit.output("monitor").unwrap(), Some(json!(true)));

    // Level falls: the pump enters its cooldown, output goes false.
    sim.handle().send("level", "put", event_data! { "value" => 30.0 }).await.unwrap();
    assert_eq!(circuit.output("pump").unwrap(), Some(json!(false)));

    // A new high level during the cooldown is rejected by the table.
    sim.handle().send("level", "put", event_data! { "value" => 90.0 }).await.unwrap();
    assert_eq!(circuit.output("pump").unwrap(), Some(json!(false)));
    assert_eq!(circuit.output("starts").unwrap(), Some(json!(1)));

    // After the 2 s cooldown the pump is available again.
    tokio::time::advance(Duration::from_secs(2)).await;
    settle(&sim).await;
    sim.handle().send("level", "put", event_data! { "value" => 30.0 }).await.unwrap();
    sim.handle().send("level", "put", event_data! { "value" => 95.0 }).await.unwrap();
    assert_eq!(circuit.output("pump").unwrap(), Some(json!(true)));
    assert_eq!(circuit.output("starts").unwrap(), Some(json!(2)));

    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn validator_rejects_non_numeric_levels() {
    let circuit = Circuit::named("plant-validate");
    build_plant(&circuit, 70.0).unwrap();
    let sim = Simulation::start(circuit.clone()).unwrap();
    settle(&sim).await;

    let accepted = sim.handle()
                      .send("level", "put", event_data! { "value" => "not a number" })
                      .await
                      .unwrap();
    assert_eq!(accepted, json!(false));
    assert_eq!(circuit.output("level").unwrap(), Some(json!(0.0)));
    sim.shutdown().await.unwrap();
}

//! Timed states under paused tokio time.

use std::time::Duration;

use circ_blocks::interval_timer;
use circ_core::{Circuit, EventData, SeqBlockBuilder, Simulation};
use serde_json::json;

const HALF: Duration = Duration::from_millis(500);

/// Round trip through the simulation loop: everything queued before this
/// call (including due timers) has been processed when it returns.
async fn settle(sim: &Simulation) {
    sim.handle().checkpoint().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn square_wave_at_one_hertz() {
    let circuit = Circuit::named("osc-test");
    SeqBlockBuilder::new("osc", interval_timer(false, HALF, HALF).unwrap()).register(&circuit)
                                                                           .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    settle(&sim).await;

    // t = 0: initial state 'off'.
    assert_eq!(circuit.output("osc").unwrap(), Some(json!(false)));

    // One full second of history per iteration: 0.5 -> on, 1.0 -> off, ...
    for expected in [true, false, true, false] {
        tokio::time::advance(HALF).await;
        settle(&sim).await;
        assert_eq!(circuit.output("osc").unwrap(), Some(json!(expected)));
    }
    sim.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn restartable_start_rewinds_the_on_timer() {
    let circuit = Circuit::named("osc-restart");
    let second = Duration::from_secs(1);
    SeqBlockBuilder::new("osc", interval_timer(true, second, second).unwrap()).register(&circuit)
                                                                              .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    settle(&sim).await;

    assert_eq!(sim.handle().send("osc", "start", EventData::new()).await.unwrap(), json!(true));
    assert_eq!(circuit.output("osc").unwrap(), Some(json!(true)));

    // t = 0.6: restart the 'on' timer; expiry moves from 1.0 to 1.6.
    tokio::time::advance(Duration::from_millis(600)).await;
    settle(&sim).await;
    assert_eq!(sim.handle().send("osc", "start", EventData::new()).await.unwrap(), json!(true));

    // t = 1.1: without the restart this would already be 'off'.
    tokio::time::advance(Duration::from_millis(500)).await;
    settle(&sim).await;
    assert_eq!(circuit.output("osc").unwrap(), Some(json!(true)));

    // t = 1.6: now it expires.
    tokio::time::advance(Duration::from_millis(500)).await;
    settle(&sim).await;
    assert_eq!(circuit.output("osc").unwrap(), Some(json!(false)));
    sim.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn non_restartable_start_is_rejected_while_on() {
    let circuit = Circuit::named("osc-fixed");
    let second = Duration::from_secs(1);
    SeqBlockBuilder::new("osc", interval_timer(false, second, second).unwrap()).register(&circuit)
                                                                               .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    settle(&sim).await;

    assert_eq!(sim.handle().send("osc", "start", EventData::new()).await.unwrap(), json!(true));
    tokio::time::advance(Duration::from_millis(600)).await;
    settle(&sim).await;

    // Rejected: the timer keeps its original expiry at t = 1.0.
    assert_eq!(sim.handle().send("osc", "start", EventData::new()).await.unwrap(), json!(false));
    tokio::time::advance(Duration::from_millis(500)).await;
    settle(&sim).await;
    assert_eq!(circuit.output("osc").unwrap(), Some(json!(false)));
    sim.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn per_event_duration_override_wins() {
    let circuit = Circuit::named("osc-override");
    let second = Duration::from_secs(1);
    SeqBlockBuilder::new("osc", interval_timer(true, second, second).unwrap()).register(&circuit)
                                                                              .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    settle(&sim).await;

    // duration item overrides the instance default (1 s -> 0.2 s).
    let mut data = EventData::new();
    data.insert("duration".into(), json!(0.2));
    assert_eq!(sim.handle().send("osc", "start", data).await.unwrap(), json!(true));
    assert_eq!(circuit.output("osc").unwrap(), Some(json!(true)));

    tokio::time::advance(Duration::from_millis(250)).await;
    settle(&sim).await;
    assert_eq!(circuit.output("osc").unwrap(), Some(json!(false)));
    sim.shutdown().await.unwrap();
}

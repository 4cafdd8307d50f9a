//! Dispatcher semantics: conditional events, external tagging, output-event
//! channels and filter composition.

use std::sync::{Arc, Mutex};

use circ_blocks::{rise, Counter, ValueInput};
use circ_core::{event_data, BlockCtx, Circuit, CircuitError, EventData, EventSpec, EventType, ExternalEvent,
                FilterResult, SeqBlockBuilder, SeqLogic, Simulation};
use serde_json::{json, Value};

/// Test block: records every delivered (event, payload) pair.
#[derive(Clone, Default)]
struct Probe {
    seen: Arc<Mutex<Vec<(String, EventData)>>>,
}

impl Probe {
    fn log(&self) -> Vec<(String, EventData)> {
        self.seen.lock().unwrap().clone()
    }
}

impl SeqLogic for Probe {
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    _ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        self.seen.lock().unwrap().push((etype.label(), data.clone()));
        Ok(Value::Bool(true))
    }

    fn init_regular(&mut self, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(Value::Null);
        Ok(())
    }

    fn init_from_value(&mut self, value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(value);
        Ok(())
    }
}

#[tokio::test]
async fn conditional_events_resolve_by_value_truthiness() {
    let circuit = Circuit::named("cond-test");
    SeqBlockBuilder::new("count", Counter::new()).register(&circuit).unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    let etype = EventType::cond(None, Some(EventType::name("inc")));

    // Truthy value resolves to the missing branch: no event at all.
    let r = sim.handle()
               .send("count", etype.clone(), event_data! { "value" => true })
               .await
               .unwrap();
    assert_eq!(r, Value::Null);
    assert_eq!(circuit.output("count").unwrap(), Some(json!(0)));

    // Falsy value resolves to `inc`.
    sim.handle()
       .send("count", etype, event_data! { "value" => 0 })
       .await
       .unwrap();
    assert_eq!(circuit.output("count").unwrap(), Some(json!(1)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn external_sources_are_tagged() {
    let circuit = Circuit::named("ext-test");
    let probe = Probe::default();
    SeqBlockBuilder::new("probe", probe.clone()).register(&circuit).unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    let ev = ExternalEvent::new(sim.handle().clone(), "probe", "ping", "button");
    ev.send(true).await.unwrap();
    // An already-tagged source is not tagged twice.
    ev.send_data(event_data! { "source" => "_ext_panel", "value" => 1 }).await.unwrap();

    let log = probe.log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].1.get("source"), Some(&json!("_ext_button")));
    assert_eq!(log[1].1.get("source"), Some(&json!("_ext_panel")));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn external_send_outside_the_ready_window_is_invalid() {
    let circuit = Circuit::named("not-ready");
    SeqBlockBuilder::new("probe", Probe::default()).register(&circuit).unwrap();
    // Never started: there is no control handle at all yet.
    assert!(circuit.control_handle().is_none());
    assert!(!circuit.is_ready());

    let sim = Simulation::start(circuit.clone()).unwrap();
    let handle = sim.handle().clone();
    sim.shutdown().await.unwrap();

    // After the stop sequence the circuit no longer accepts external events.
    let err = handle.send("probe", "ping", EventData::new()).await.unwrap_err();
    assert!(matches!(err, CircuitError::InvalidState(_)));
}

#[tokio::test]
async fn edge_rise_filter_delivers_twice() {
    let circuit = Circuit::named("edge-test");
    // Registered first so it is initialized before `x` starts firing.
    SeqBlockBuilder::new("count", Counter::new()).register(&circuit).unwrap();
    SeqBlockBuilder::new("x", ValueInput::new())
        .initdef(false)
        .on_output(EventSpec::new("count", "inc").filter(rise()))
        .register(&circuit)
        .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    let put = |v: bool| sim.handle().send("x", "put", event_data! { "value" => v });
    // Source output sequence: UNDEF (pre-init), false (initdef), then:
    put(true).await.unwrap();
    put(true).await.unwrap();
    put(false).await.unwrap();
    put(true).await.unwrap();

    // false->true happened twice; everything else was filtered out.
    assert_eq!(circuit.output("count").unwrap(), Some(json!(2)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn on_every_output_fires_without_change_but_does_not_propagate() {
    let circuit = Circuit::named("every-test");
    SeqBlockBuilder::new("changes", Counter::new()).register(&circuit).unwrap();
    SeqBlockBuilder::new("commits", Counter::new()).register(&circuit).unwrap();
    SeqBlockBuilder::new("x", ValueInput::new())
        .initdef(7)
        .on_output(EventSpec::new("changes", "inc"))
        .on_every_output(EventSpec::new("commits", "inc"))
        .register(&circuit)
        .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    let put = |v: i64| sim.handle().send("x", "put", event_data! { "value" => v });
    put(7).await.unwrap(); // unchanged
    put(7).await.unwrap(); // unchanged
    put(8).await.unwrap(); // changed

    // on_output: initdef commit (UNDEF->7) + the change to 8.
    assert_eq!(circuit.output("changes").unwrap(), Some(json!(2)));
    // on_every_output: initdef + three puts.
    assert_eq!(circuit.output("commits").unwrap(), Some(json!(4)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejecting_filter_stops_the_pipeline() {
    let circuit = Circuit::named("filter-test");
    let witness = Arc::new(Mutex::new(Vec::<&str>::new()));
    let w1 = Arc::clone(&witness);
    let w2 = Arc::clone(&witness);

    SeqBlockBuilder::new("count", Counter::new()).register(&circuit).unwrap();
    SeqBlockBuilder::new("x", ValueInput::new())
        .initdef(0)
        .on_output(EventSpec::new("count", "inc")
            .filter(move |d| {
                w1.lock().unwrap().push("first");
                FilterResult::Accept(d)
            })
            .filter(|_| FilterResult::Reject)
            .filter(move |d| {
                w2.lock().unwrap().push("third");
                FilterResult::Accept(d)
            }))
        .register(&circuit)
        .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().send("x", "put", event_data! { "value" => 5 }).await.unwrap();

    // Nothing was delivered and the third filter never ran.
    assert_eq!(circuit.output("count").unwrap(), Some(json!(0)));
    let seen = witness.lock().unwrap().clone();
    assert!(seen.iter().all(|s| *s == "first"), "{seen:?}");
    sim.shutdown().await.unwrap();
}

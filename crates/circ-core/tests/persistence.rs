//! Persistent state: save/restore round trip, expiration and FSM
//! resumption.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use circ_blocks::Counter;
use circ_core::fsm::{Automaton, Fsm, States, Transition};
use circ_core::{event_data, Circuit, CircuitError, InMemoryStateStore, SeqBlockBuilder, Simulation, StateStore,
                StoredState};
use serde_json::json;

/// Store compartible entre dos circuitos consecutivos (simula reinicios).
#[derive(Clone, Default)]
struct SharedStore {
    inner: Arc<Mutex<InMemoryStateStore>>,
}

impl StateStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<StoredState>, CircuitError> {
        self.inner.lock().unwrap().get(key)
    }

    fn put(&mut self, key: &str, payload: &[u8]) -> Result<(), CircuitError> {
        self.inner.lock().unwrap().put(key, payload)
    }

    fn delete(&mut self, key: &str) -> Result<(), CircuitError> {
        self.inner.lock().unwrap().delete(key)
    }
}

/// Store cuyo único registro aparenta tener la edad indicada.
struct AgedStore {
    key: String,
    payload: Vec<u8>,
    age: chrono::Duration,
}

impl StateStore for AgedStore {
    fn get(&self, key: &str) -> Result<Option<StoredState>, CircuitError> {
        if key == self.key {
            Ok(Some(StoredState { payload: self.payload.clone(),
                                  saved_at: Utc::now() - self.age }))
        } else {
            Ok(None)
        }
    }

    fn put(&mut self, _key: &str, _payload: &[u8]) -> Result<(), CircuitError> {
        Ok(())
    }

    fn delete(&mut self, _key: &str) -> Result<(), CircuitError> {
        Ok(())
    }
}

fn counter_circuit(name: &str, store: impl StateStore + 'static) -> Circuit {
    let circuit = Circuit::named(name);
    SeqBlockBuilder::new("count", Counter::new()).persistent(Some(Duration::from_secs(3600)))
                                                 .register(&circuit)
                                                 .unwrap();
    circuit.set_state_store(Box::new(store));
    circuit
}

#[tokio::test]
async fn counter_state_survives_a_restart() {
    let store = SharedStore::default();

    let first = counter_circuit("persist-1", store.clone());
    let sim = Simulation::start(first.clone()).unwrap();
    for _ in 0..3 {
        sim.handle().send("count", "inc", event_data! { "amount" => 1 }).await.unwrap();
    }
    // The stop sequence flushes persistent state.
    sim.shutdown().await.unwrap();

    let second = counter_circuit("persist-2", store);
    let sim = Simulation::start(second.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    assert_eq!(second.output("count").unwrap(), Some(json!(3)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn expired_records_are_ignored() {
    let store = AgedStore { key: "count".into(),
                            payload: serde_json::to_vec(&json!(42)).unwrap(),
                            age: chrono::Duration::seconds(7200) };
    let circuit = counter_circuit("persist-expired", store);
    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    // Older than the 1 h expiration: the counter fell back to regular init.
    assert_eq!(circuit.output("count").unwrap(), Some(json!(0)));
    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn future_records_are_kept_with_a_warning() {
    // Reloj hacia atrás: el registro "del futuro" sigue siendo válido.
    let store = AgedStore { key: "count".into(),
                            payload: serde_json::to_vec(&json!(42)).unwrap(),
                            age: chrono::Duration::seconds(-600) };
    let circuit = counter_circuit("persist-future", store);
    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    assert_eq!(circuit.output("count").unwrap(), Some(json!(42)));
    sim.shutdown().await.unwrap();
}

struct Door;
const DOOR_STATES: &[&str] = &["closed", "open"];
const DOOR_TRANS: &[Transition] = &[Transition::new("open", States::One("closed"), Some("open")),
                                    Transition::new("close", States::One("open"), Some("closed"))];

impl Automaton for Door {
    fn states() -> &'static [&'static str] {
        DOOR_STATES
    }
    fn transitions() -> &'static [Transition] {
        DOOR_TRANS
    }
}

#[tokio::test]
async fn fsm_resumes_its_persisted_state_without_enter_hooks() {
    let store = SharedStore::default();

    let first = Circuit::named("door-1");
    SeqBlockBuilder::new("door", Fsm::new(Door).unwrap()).persistent(None)
                                                         .register(&first)
                                                         .unwrap();
    SeqBlockBuilder::new("entries", Counter::new()).register(&first).unwrap();
    first.set_state_store(Box::new(store.clone()));

    let sim = Simulation::start(first.clone()).unwrap();
    sim.handle().send("door", "open", circ_core::EventData::new()).await.unwrap();
    sim.shutdown().await.unwrap();

    // Restart: the door resumes in 'open' (a resumption, not a new entry).
    let second = Circuit::named("door-2");
    SeqBlockBuilder::new("entries", Counter::new()).register(&second).unwrap();
    let fsm = Fsm::new(Door).unwrap()
                            .on_enter("open", circ_core::EventSpec::new("entries", "inc"))
                            .unwrap();
    SeqBlockBuilder::new("door", fsm).persistent(None).register(&second).unwrap();
    second.set_state_store(Box::new(store));

    let sim = Simulation::start(second.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    assert_eq!(second.output("door").unwrap(), Some(json!("open")));
    // No on_enter fired during the restore.
    assert_eq!(second.output("entries").unwrap(), Some(json!(0)));
    sim.shutdown().await.unwrap();
}

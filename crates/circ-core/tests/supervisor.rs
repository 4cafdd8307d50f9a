//! Supervisor behavior: run/shutdown/abort, monitored tasks, shield and the
//! global reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use circ_core::block::{StopFuture, TaskFuture};
use circ_core::{get_circuit, reset_circuit, run, shield, supporting, BlockCtx, Circuit, CircuitError, ControlHandle,
                EventData, EventType, SeqBlockBuilder, SeqLogic, Simulation};
use serde_json::Value;

/// Block with a main task and observable async-stop cleanup.
struct Worker {
    stop_flag: Arc<AtomicBool>,
    task: Mutex<Option<TaskFuture>>,
}

impl Worker {
    fn new(stop_flag: Arc<AtomicBool>, task: TaskFuture) -> Self {
        Self { stop_flag,
               task: Mutex::new(Some(task)) }
    }
}

impl SeqLogic for Worker {
    fn handle_event(&mut self,
                    etype: &EventType,
                    _data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                         event: etype.label() })
    }

    fn init_regular(&mut self, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(Value::Bool(true));
        Ok(())
    }

    fn init_from_value(&mut self, value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(value);
        Ok(())
    }

    fn stop_async(&self) -> Option<StopFuture> {
        let flag = Arc::clone(&self.stop_flag);
        Some(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }))
    }

    fn main_task(&self, _handle: ControlHandle) -> Option<TaskFuture> {
        self.task.lock().unwrap().take()
    }
}

fn forever() -> TaskFuture {
    Box::pin(async {
        std::future::pending::<()>().await;
        Ok(())
    })
}

#[tokio::test]
async fn graceful_shutdown_runs_async_cleanup() {
    let stopped = Arc::new(AtomicBool::new(false));
    let circuit = Circuit::named("graceful");
    SeqBlockBuilder::new("worker", Worker::new(Arc::clone(&stopped), forever())).register(&circuit)
                                                                                .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    sim.shutdown().await.unwrap();

    assert!(stopped.load(Ordering::SeqCst), "stop_async did not complete");
    assert!(circuit.is_terminal());
}

#[tokio::test]
async fn premature_main_task_exit_aborts_the_simulation() {
    let stopped = Arc::new(AtomicBool::new(false));
    let early_exit: TaskFuture = Box::pin(async { Ok(()) });
    let circuit = Circuit::named("early-exit");
    SeqBlockBuilder::new("worker", Worker::new(stopped, early_exit)).register(&circuit)
                                                                    .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    let err = sim.join().await.unwrap_err();
    assert!(matches!(err, CircuitError::Internal(msg) if msg.contains("worker")));
}

#[tokio::test]
async fn failing_main_task_surfaces_its_error() {
    let stopped = Arc::new(AtomicBool::new(false));
    let failing: TaskFuture = Box::pin(async { Err(CircuitError::Internal("sensor bus died".into())) });
    let circuit = Circuit::named("task-failure");
    SeqBlockBuilder::new("worker", Worker::new(stopped, failing)).register(&circuit)
                                                                 .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    let err = sim.join().await.unwrap_err();
    assert!(matches!(err, CircuitError::Internal(msg) if msg.contains("sensor bus died")));
}

#[tokio::test]
async fn shutdown_from_a_block_task_is_a_usage_error() {
    let seen: Arc<Mutex<Option<CircuitError>>> = Arc::new(Mutex::new(None));
    let seen_in_task = Arc::clone(&seen);
    let stopped = Arc::new(AtomicBool::new(false));

    let circuit = Circuit::named("inner-shutdown");
    // The worker's main task is built later, once we have a handle source;
    // use a placeholder block plus a monitored task instead.
    SeqBlockBuilder::new("worker", Worker::new(stopped, forever())).register(&circuit)
                                                                   .unwrap();
    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();

    let handle = sim.handle().clone();
    let probe: TaskFuture = Box::pin(async move {
        let result = handle.shutdown().await;
        *seen_in_task.lock().unwrap() = result.err();
        std::future::pending::<()>().await;
        Ok(())
    });
    sim.handle().spawn_monitored("shutdown-probe", false, probe);

    // Give the probe a chance to run, then stop from the outside.
    tokio::time::sleep(Duration::from_millis(20)).await;
    sim.shutdown().await.unwrap();

    let captured = seen.lock().unwrap().clone();
    assert!(matches!(captured, Some(CircuitError::InvalidState(_))), "{captured:?}");
}

#[tokio::test]
async fn run_treats_supporting_task_exit_as_cancellation() {
    let circuit = Circuit::named("run-ok");
    SeqBlockBuilder::new("worker", Worker::new(Arc::new(AtomicBool::new(false)), forever())).register(&circuit)
                                                                                            .unwrap();
    let quick: TaskFuture = Box::pin(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    });
    // catch_sigterm=true also exercises the signal handler installation.
    run(circuit, vec![supporting("quick", quick)], true).await.unwrap();
}

#[tokio::test]
async fn circuit_can_shut_itself_down_through_ctrl() {
    use circ_core::{event_data, EventSpec, Simulation};

    let circuit = Circuit::named("self-stop");
    // Referencing `_ctrl` is enough: finalization creates the block.
    SeqBlockBuilder::new("kill", circ_blocks::ValueInput::new())
        .initdef(false)
        .on_output(EventSpec::new("_ctrl", EventType::cond(Some(EventType::name("shutdown")), None)))
        .register(&circuit)
        .unwrap();

    let sim = Simulation::start(circuit.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    assert!(circuit.contains("_ctrl"));

    sim.handle().send("kill", "put", event_data! { "value" => true }).await.unwrap();
    // The shutdown request from inside the circuit ends the simulation.
    sim.handle().join().await.unwrap();
    assert!(circuit.is_terminal());
}

#[tokio::test]
async fn run_reports_supporting_task_failures_by_name() {
    let circuit = Circuit::named("run-fail");
    SeqBlockBuilder::new("worker", Worker::new(Arc::new(AtomicBool::new(false)), forever())).register(&circuit)
                                                                                            .unwrap();
    let failing: TaskFuture = Box::pin(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(CircuitError::Internal("mqtt connection lost".into()))
    });
    let err = run(circuit, vec![supporting("mqtt", failing)], false).await.unwrap_err();
    assert!(matches!(err, CircuitError::Internal(msg) if msg.contains("mqtt")));
}

#[tokio::test]
async fn shield_completes_the_protected_section() {
    assert_eq!(shield(async { 6 * 7 }).await.unwrap(), 42);
}

#[tokio::test]
async fn global_reset_builds_a_fresh_circuit() {
    let circuit = get_circuit();
    SeqBlockBuilder::new("worker", Worker::new(Arc::new(AtomicBool::new(false)), forever())).register(&circuit)
                                                                                            .unwrap();
    assert!(circuit.contains("worker"));

    reset_circuit().await.unwrap();
    let fresh = get_circuit();
    assert!(!fresh.contains("worker"));

    // Resetting while a simulation runs cancels and awaits it.
    SeqBlockBuilder::new("worker", Worker::new(Arc::new(AtomicBool::new(false)), forever())).register(&fresh)
                                                                                            .unwrap();
    let sim = Simulation::start(fresh.clone()).unwrap();
    sim.handle().checkpoint().await.unwrap();
    reset_circuit().await.unwrap();
    assert!(fresh.is_terminal());
    assert!(!get_circuit().contains("worker"));
}

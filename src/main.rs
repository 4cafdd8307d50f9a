//! Binario principal: corre la planta demo hasta que expira el tiempo
//! configurado o llega SIGTERM.

use std::time::Duration;

use circ_core::{run, supporting, Circuit, CircuitError, ExternalEvent};
use circ_persistence::FileStateStore;
use circuitflow_rust::config::CONFIG;
use circuitflow_rust::demo::build_plant;
use log::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let circuit = Circuit::named("plant");
    build_plant(&circuit, 70.0)?;
    let store = FileStateStore::open(&CONFIG.state_file)?;
    circuit.set_state_store(Box::new(store));

    run(circuit.clone(),
        vec![supporting("level-feeder", Box::pin(feed_levels(circuit))),
             supporting("deadline", Box::pin(demo_deadline()))],
        true).await?;
    info!("bye");
    Ok(())
}

/// Simula el nivel del depósito: una rampa que sube hasta rebosar y baja
/// cuando la bomba corre.
async fn feed_levels(circuit: Circuit) -> Result<(), CircuitError> {
    let handle = wait_for_handle(&circuit).await?;
    let level = ExternalEvent::new(handle, "level", "put", "feeder");
    let mut value: f64 = 20.0;
    let mut filling = true;
    let period = Duration::from_millis(CONFIG.sample_millis);
    loop {
        tokio::time::sleep(period).await;
        value += if filling { 7.0 } else { -9.0 };
        if value >= 100.0 {
            filling = false;
        }
        if value <= 10.0 {
            filling = true;
        }
        let _ = level.send(value).await;
    }
}

/// Termina el demo pasados `CIRCUITFLOW_DEMO_SECONDS` (0 = sólo SIGTERM).
async fn demo_deadline() -> Result<(), CircuitError> {
    if CONFIG.demo_seconds == 0 {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(Duration::from_secs(CONFIG.demo_seconds)).await;
    info!("demo time is up");
    Ok(())
}

/// El handle de control existe en cuanto la simulación arranca; la tarea de
/// apoyo corre en paralelo, así que puede tocar esperar un instante.
async fn wait_for_handle(circuit: &Circuit) -> Result<circ_core::ControlHandle, CircuitError> {
    for _ in 0..100 {
        if let Some(h) = circuit.control_handle() {
            return Ok(h);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(CircuitError::InvalidState("the simulation never started".into()))
}

//! Supervisor de concurrencia: anfitrión de la tarea de simulación y de las
//! tareas cooperativas del host.
//!
//! Modelo de ejecución:
//! - Todo el código de bloques (propagación, handlers, transiciones FSM,
//!   filtros, fases de init) corre dentro de una única tarea de simulación;
//!   las suspensiones sólo ocurren en `init_async`/`stop_async`, timers y
//!   tareas de apoyo.
//! - La tarea de simulación drena un canal de control (eventos externos con
//!   respuesta, abort, shutdown, checkpoint) y la rueda de tiempo; el orden
//!   entre dos eventos al mismo bloque es FIFO estricto.
//! - Las tareas monitorizadas escalan su fallo vía `abort`; el primer error
//!   gana y se re-lanza desde `run`/`shutdown`.

pub mod timer;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::block::seq::TaskFuture;
use crate::circuit::{Circuit, ControlRequest};
use crate::errors::CircuitError;
use crate::event::{EventData, EventType};

tokio::task_local! {
    /// Marca la tarea de simulación y las tareas poseídas por bloques.
    static IN_SIM: bool;
}

/// `InvalidState` si el llamante corre dentro de la simulación o de una
/// tarea de bloque; esos contextos deben usar `abort`.
pub(crate) fn ensure_outside_simulation(op: &str) -> Result<(), CircuitError> {
    if IN_SIM.try_with(|v| *v).unwrap_or(false) {
        return Err(CircuitError::InvalidState(format!("{op} must not be called from a simulation-owned task; use \
                                                       abort instead")));
    }
    Ok(())
}

pub(crate) enum ControlMsg {
    External {
        dst: String,
        etype: EventType,
        data: EventData,
        reply: oneshot::Sender<Result<Value, CircuitError>>,
    },
    Abort(CircuitError),
    Shutdown,
    Checkpoint {
        reply: oneshot::Sender<Result<(), CircuitError>>,
    },
}

struct Monitored {
    name: String,
    handle: JoinHandle<()>,
}

struct RtShared {
    result: Mutex<Option<Result<(), CircuitError>>>,
    done: watch::Sender<bool>,
    monitored: Mutex<Vec<Monitored>>,
}

impl RtShared {
    fn lock_result(&self) -> MutexGuard<'_, Option<Result<(), CircuitError>>> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_monitored(&self) -> MutexGuard<'_, Vec<Monitored>> {
        self.monitored.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle de control de una simulación en marcha. Clonable; todos los clones
/// hablan con la misma tarea.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlMsg>,
    shared: Arc<RtShared>,
}

impl ControlHandle {
    /// Entrega un evento externo y devuelve el resultado del handler.
    /// Falla con `InvalidState` si el circuito aún no está listo o la
    /// simulación ya terminó.
    pub async fn send(&self,
                      dst: impl Into<String>,
                      etype: impl Into<EventType>,
                      data: EventData)
                      -> Result<Value, CircuitError> {
        let (reply, rx) = oneshot::channel();
        let msg = ControlMsg::External { dst: dst.into(),
                                         etype: etype.into(),
                                         data,
                                         reply };
        self.tx
            .send(msg)
            .map_err(|_| CircuitError::InvalidState("the simulation is not running".into()))?;
        rx.await
          .map_err(|_| CircuitError::InvalidState("the simulation stopped before handling the event".into()))?
    }

    /// Marca el error terminal y cancela la simulación. El primer error
    /// gana; llamadas posteriores se ignoran. Seguro desde cualquier tarea.
    pub fn abort(&self, error: CircuitError) {
        let _ = self.tx.send(ControlMsg::Abort(error));
    }

    /// Cancela la simulación y espera su limpieza. Retorna normalmente si
    /// terminó por cancelación; si terminó con error, lo propaga. Es un
    /// error de uso llamarlo desde la propia simulación.
    pub async fn shutdown(&self) -> Result<(), CircuitError> {
        ensure_outside_simulation("shutdown")?;
        let _ = self.tx.send(ControlMsg::Shutdown);
        match self.join().await {
            Err(e) if e.is_cancelled() => Ok(()),
            other => other,
        }
    }

    /// Volcado inmediato del estado persistente.
    pub async fn checkpoint(&self) -> Result<(), CircuitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlMsg::Checkpoint { reply })
            .map_err(|_| CircuitError::InvalidState("the simulation is not running".into()))?;
        rx.await
          .map_err(|_| CircuitError::InvalidState("the simulation stopped during the checkpoint".into()))?
    }

    /// Espera el final de la simulación y devuelve su resultado.
    pub async fn join(&self) -> Result<(), CircuitError> {
        let mut rx = self.shared.done.subscribe();
        loop {
            if *rx.borrow() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.shared.lock_result().clone().unwrap_or(Ok(()))
    }

    pub fn is_finished(&self) -> bool {
        *self.shared.done.subscribe().borrow()
    }

    /// Lanza una tarea cooperativa monitorizada: un fallo llama a `abort`;
    /// para `is_service = true`, también una terminación normal cuenta como
    /// error. La cancelación nunca es un error.
    pub fn spawn_monitored(&self, name: impl Into<String>, is_service: bool, fut: TaskFuture) {
        let name = name.into();
        let this = self.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(IN_SIM.scope(true, async move {
            match fut.await {
                Ok(()) => {
                    if is_service {
                        this.abort(CircuitError::Internal(format!("service task '{task_name}' exited prematurely")));
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => this.abort(CircuitError::Internal(format!("task '{task_name}': {e}"))),
            }
        }));
        self.shared.lock_monitored().push(Monitored { name, handle });
    }

    /// Cancela y espera todas las tareas monitorizadas.
    pub(crate) async fn cancel_monitored(&self) {
        let tasks: Vec<Monitored> = self.shared.lock_monitored().drain(..).collect();
        for task in tasks {
            task.handle.abort();
            match task.handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("monitored task '{}' ended abnormally: {e}", task.name),
            }
        }
    }
}

/// Protege una sección crítica corta de la cancelación inmediata: el futuro
/// corre hasta completarse en una tarea aparte y una cancelación pendiente
/// se observa recién al retornar. No debe usarse para suprimir la
/// cancelación por completo.
pub async fn shield<T, F>(fut: F) -> Result<T, CircuitError>
    where F: Future<Output = T> + Send + 'static,
          T: Send + 'static
{
    tokio::spawn(fut).await
                     .map_err(|e| CircuitError::Internal(format!("shielded section failed: {e}")))
}

/// Emisor de eventos externos ligado a `(destino, tipo, fuente)`, pensado
/// para corutinas de I/O del host.
pub struct ExternalEvent {
    handle: ControlHandle,
    dest: String,
    etype: EventType,
    source: String,
}

impl ExternalEvent {
    pub fn new(handle: ControlHandle,
               dest: impl Into<String>,
               etype: impl Into<EventType>,
               source: impl Into<String>)
               -> Self {
        Self { handle,
               dest: dest.into(),
               etype: etype.into(),
               source: source.into() }
    }

    /// Envía `value` como payload mínimo (`source` + `value`).
    pub async fn send(&self, value: impl Into<Value>) -> Result<Value, CircuitError> {
        let mut data = EventData::new();
        data.insert("source".to_string(), Value::String(self.source.clone()));
        data.insert("value".to_string(), value.into());
        self.handle.send(self.dest.clone(), self.etype.clone(), data).await
    }

    /// Envía un payload arbitrario; `source` se completa si falta.
    pub async fn send_data(&self, mut data: EventData) -> Result<Value, CircuitError> {
        data.entry("source".to_string())
            .or_insert_with(|| Value::String(self.source.clone()));
        self.handle.send(self.dest.clone(), self.etype.clone(), data).await
    }
}

/// Simulación en marcha.
pub struct Simulation {
    handle: ControlHandle,
}

impl Simulation {
    /// Lanza la tarea de simulación sobre el circuito dado. Debe llamarse
    /// dentro de un runtime tokio.
    pub fn start(circuit: Circuit) -> Result<Self, CircuitError> {
        {
            let st = circuit.lock();
            if st.terminal {
                return Err(CircuitError::InvalidState("circuit already stopped; reset and rebuild".into()));
            }
            if st.ctl.is_some() {
                return Err(CircuitError::InvalidState("the simulation is already running".into()));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(false);
        let shared = Arc::new(RtShared { result: Mutex::new(None),
                                         done,
                                         monitored: Mutex::new(Vec::new()) });
        let handle = ControlHandle { tx, shared: Arc::clone(&shared) };
        circuit.lock().ctl = Some(handle.clone());

        let task_handle = handle.clone();
        tokio::spawn(IN_SIM.scope(true, sim_task(circuit, rx, task_handle, shared)));
        Ok(Self { handle })
    }

    pub fn handle(&self) -> &ControlHandle {
        &self.handle
    }

    pub async fn join(&self) -> Result<(), CircuitError> {
        self.handle.join().await
    }

    pub async fn shutdown(&self) -> Result<(), CircuitError> {
        self.handle.shutdown().await
    }
}

async fn sim_task(circuit: Circuit,
                  mut rx: mpsc::UnboundedReceiver<ControlMsg>,
                  handle: ControlHandle,
                  shared: Arc<RtShared>) {
    let started = crate::init::start_sequence(&circuit, &handle).await;
    let outcome = match started {
        Err(e) => Err(e),
        Ok(()) => sim_loop(&circuit, &mut rx).await,
    };
    // El primer error registrado en el circuito manda sobre un Ok del loop.
    let outcome = match (outcome, circuit.error()) {
        (Err(e), _) => Err(e),
        (Ok(()), Some(e)) => Err(e),
        (Ok(()), None) => Ok(()),
    };

    crate::init::stop_sequence(&circuit, &handle).await;

    match &outcome {
        Ok(()) => info!("[{}] simulation finished", circuit.name()),
        Err(e) if e.is_cancelled() => info!("[{}] simulation cancelled: {e}", circuit.name()),
        Err(e) => warn!("[{}] simulation failed: {e}", circuit.name()),
    }
    *shared.lock_result() = Some(outcome);
    let _ = shared.done.send(true);
}

async fn sim_loop(circuit: &Circuit, rx: &mut mpsc::UnboundedReceiver<ControlMsg>) -> Result<(), CircuitError> {
    loop {
        // Peticiones de control generadas dentro del circuito (`_ctrl`).
        for req in circuit.lock().take_control_requests() {
            match req {
                ControlRequest::Shutdown => return Ok(()),
                ControlRequest::Abort(e) => return Err(e),
            }
        }

        let deadline = circuit.lock().wheel.next_deadline();
        let wake = deadline.unwrap_or_else(tokio::time::Instant::now);
        tokio::select! {
            // Los timers vencidos se despachan antes que los mensajes
            // nuevos: orden por instante de vencimiento.
            biased;
            _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                let now = tokio::time::Instant::now();
                circuit.lock().fire_due_timers(now)?;
            }
            msg = rx.recv() => match msg {
                // Sin emisores: nadie más puede hablarnos; apagado ordenado.
                None => return Ok(()),
                Some(ControlMsg::Shutdown) => return Ok(()),
                Some(ControlMsg::Abort(e)) => return Err(e),
                Some(ControlMsg::Checkpoint { reply }) => {
                    circuit.lock().flush_persistent();
                    let _ = reply.send(Ok(()));
                }
                Some(ControlMsg::External { dst, etype, data, reply }) => {
                    let result = circuit.lock().external_send(&dst, &etype, data);
                    let fatal = matches!(&result, Err(e) if !e.is_benign());
                    let failure = result.as_ref().err().cloned();
                    let _ = reply.send(result);
                    if fatal {
                        if let Some(e) = failure {
                            return Err(e);
                        }
                    }
                }
            },
        }
    }
}

/// Tarea de apoyo del host, supervisada junto a la simulación.
pub struct SupportingTask {
    name: String,
    fut: TaskFuture,
}

/// Construye una tarea de apoyo con nombre (el nombre identifica la tarea en
/// el error que `run` re-lanza).
pub fn supporting(name: impl Into<String>, fut: TaskFuture) -> SupportingTask {
    SupportingTask { name: name.into(), fut }
}

/// Punto de entrada de la aplicación: arranca la simulación, lanza las
/// tareas de apoyo y supervisa el conjunto.
///
/// - Si cualquier tarea de apoyo termina, el resto se cancela y la
///   simulación se apaga.
/// - El error de la simulación (no cancelación) tiene prioridad; en su
///   defecto se re-lanza el primer error de una tarea de apoyo, anotado con
///   su nombre.
/// - La cancelación sola — incluida la inducida por SIGTERM cuando
///   `catch_sigterm` — es una salida normal (`Ok`).
pub async fn run(circuit: Circuit, tasks: Vec<SupportingTask>, catch_sigterm: bool) -> Result<(), CircuitError> {
    let sim = Simulation::start(circuit)?;
    let handle = sim.handle().clone();

    let mut set: JoinSet<(String, Result<(), CircuitError>)> = JoinSet::new();
    for task in tasks {
        let name = task.name;
        let fut = task.fut;
        set.spawn(async move { (name, fut.await) });
    }

    let mut sigterm = if catch_sigterm {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("cannot install SIGTERM handler: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut supporting_failure: Option<(String, CircuitError)> = None;
    let sim_result = loop {
        tokio::select! {
            result = handle.join() => break result,
            joined = set.join_next(), if !set.is_empty() => {
                match joined {
                    Some(Ok((name, result))) => {
                        debug!("supporting task '{name}' finished");
                        if let Err(e) = result {
                            if !e.is_cancelled() && supporting_failure.is_none() {
                                supporting_failure = Some((name, e));
                            }
                        }
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        if supporting_failure.is_none() {
                            supporting_failure = Some(("<unknown>".into(), CircuitError::Internal(e.to_string())));
                        }
                    }
                    None => {}
                }
                // Cualquier salida de una tarea de apoyo desarma el resto.
                set.abort_all();
                handle.abort(CircuitError::Cancelled("a supporting task finished".into()));
            }
            _ = recv_sigterm(&mut sigterm), if sigterm.is_some() => {
                info!("SIGTERM received, cancelling the simulation");
                handle.abort(CircuitError::Cancelled("SIGTERM".into()));
            }
        }
    };

    set.abort_all();
    while set.join_next().await.is_some() {}

    match sim_result {
        Err(e) if !e.is_cancelled() => Err(e),
        _ => match supporting_failure {
            Some((name, e)) => Err(CircuitError::Internal(format!("supporting task '{name}': {e}"))),
            None => Ok(()),
        },
    }
}

async fn recv_sigterm(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

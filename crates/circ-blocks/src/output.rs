//! Adaptadores de salida: puente entre el circuito y el mundo exterior.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use circ_core::runtime::{shield, ControlHandle};
use circ_core::{BlockCtx, CircuitError, EventData, EventType, SeqLogic};
use serde_json::Value;
use tokio::sync::Notify;

/// Salida síncrona: cada evento `put` invoca el callback con el valor y la
/// salida del bloque refleja el último valor escrito.
pub struct OutputFunc {
    func: Arc<dyn Fn(&Value) -> Result<(), CircuitError> + Send + Sync>,
}

impl OutputFunc {
    pub fn new(func: impl Fn(&Value) -> Result<(), CircuitError> + Send + Sync + 'static) -> Self {
        Self { func: Arc::new(func) }
    }
}

impl SeqLogic for OutputFunc {
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        match etype {
            EventType::Name(n) if n == "put" => {
                let value = data.get("value")
                                .cloned()
                                .ok_or_else(|| CircuitError::block(ctx.name(), "put without a value item"))?;
                (self.func)(&value).map_err(|e| CircuitError::block(ctx.name(), e))?;
                ctx.set_output(value);
                Ok(Value::Bool(true))
            }
            other => Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                                      event: other.label() }),
        }
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

/// Destino asíncrono de valores (hardware, red, etc.).
#[async_trait]
pub trait OutputDriver: Send + Sync + 'static {
    async fn write(&self, value: Value) -> Result<(), CircuitError>;
}

/// Salida asíncrona con cola y guard time.
///
/// Los eventos `put` encolan el valor; la tarea principal del bloque lo
/// escribe en el driver y luego duerme `guard_time` bajo `shield` (la pausa
/// es obligatoria e incancelable, por lo que `guard_time` debe caber en el
/// `stop_timeout` del bloque). El valor se retira de la cola dentro de la
/// sección blindada: aunque la tarea principal sea cancelada a mitad de
/// escritura, ningún valor se escribe dos veces ni se pierde, y
/// `stop_async` puede drenar lo que quede.
pub struct AsyncOutput {
    driver: Arc<dyn OutputDriver>,
    queue: Arc<Mutex<VecDeque<Value>>>,
    notify: Arc<Notify>,
    writing: Arc<AtomicBool>,
    guard_time: Duration,
    stop_timeout: Duration,
}

impl AsyncOutput {
    pub fn new(driver: impl OutputDriver,
               guard_time: Duration,
               stop_timeout: Duration)
               -> Result<Self, CircuitError> {
        if guard_time > stop_timeout {
            return Err(CircuitError::InvalidState(format!("guard_time {guard_time:?} exceeds stop_timeout \
                                                           {stop_timeout:?}")));
        }
        Ok(Self { driver: Arc::new(driver),
                  queue: Arc::new(Mutex::new(VecDeque::new())),
                  notify: Arc::new(Notify::new()),
                  writing: Arc::new(AtomicBool::new(false)),
                  guard_time,
                  stop_timeout })
    }

    /// Timeout a configurar en el builder del bloque.
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    fn queue_front(queue: &Mutex<VecDeque<Value>>) -> Option<Value> {
        queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).front().cloned()
    }

    fn queue_pop(queue: &Mutex<VecDeque<Value>>) {
        queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front();
    }
}

impl SeqLogic for AsyncOutput {
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        match etype {
            EventType::Name(n) if n == "put" => {
                let value = data.get("value")
                                .cloned()
                                .ok_or_else(|| CircuitError::block(ctx.name(), "put without a value item"))?;
                self.queue
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push_back(value.clone());
                self.notify.notify_one();
                ctx.set_output(value);
                Ok(Value::Bool(true))
            }
            other => Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                                      event: other.label() }),
        }
    }

    fn init_regular(&mut self, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(Value::Null);
        Ok(())
    }

    fn init_from_value(&mut self, value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(value);
        Ok(())
    }

    fn main_task(&self, _handle: ControlHandle) -> Option<circ_core::block::TaskFuture> {
        let driver = Arc::clone(&self.driver);
        let queue = Arc::clone(&self.queue);
        let notify = Arc::clone(&self.notify);
        let writing = Arc::clone(&self.writing);
        let guard_time = self.guard_time;
        Some(Box::pin(async move {
            loop {
                let Some(value) = Self::queue_front(&queue) else {
                    notify.notified().await;
                    continue;
                };
                let driver = Arc::clone(&driver);
                let queue = Arc::clone(&queue);
                let writing = Arc::clone(&writing);
                // Escritura + guard time + pop protegidos de la cancelación:
                // una acción de salida nunca queda a medias.
                shield(async move {
                    writing.store(true, Ordering::SeqCst);
                    let result = driver.write(value).await;
                    tokio::time::sleep(guard_time).await;
                    Self::queue_pop(&queue);
                    writing.store(false, Ordering::SeqCst);
                    result
                }).await??;
            }
        }))
    }

    fn stop_async(&self) -> Option<circ_core::block::StopFuture> {
        let driver = Arc::clone(&self.driver);
        let queue = Arc::clone(&self.queue);
        let writing = Arc::clone(&self.writing);
        let guard_time = self.guard_time;
        Some(Box::pin(async move {
            // Espera una escritura blindada en vuelo y drena el resto de la
            // cola; el stop_timeout del bloque acota todo el proceso.
            while writing.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            while let Some(value) = Self::queue_front(&queue) {
                driver.write(value).await?;
                tokio::time::sleep(guard_time).await;
                Self::queue_pop(&queue);
            }
            Ok(())
        }))
    }
}

//! Bloques secuenciales: estado interno + eventos tipados.
//!
//! Capacidades opcionales (composición, no herencia): el supervisor sondea
//! cada método de capacidad y usa lo que el bloque implemente.
//! - persistencia: `save_state`/`restore_state` (+ opt-in en el builder);
//! - init asíncrono: `init_async` devuelve un futuro `'static` que calcula
//!   el valor inicial sin retener el bloque — si un evento inicializa el
//!   bloque mientras tanto, el valor producido se descarta;
//! - stop asíncrono: `stop_async`, acotado por el `stop_timeout` del bloque;
//! - tarea principal: `main_task`, una tarea monitorizada ligada a la vida
//!   del bloque.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use super::ctx::BlockCtx;
use crate::constants::{DEFAULT_INIT_TIMEOUT, DEFAULT_STOP_TIMEOUT};
use crate::errors::CircuitError;
use crate::event::{EventData, EventType};
use crate::runtime::ControlHandle;

/// Futuro de init asíncrono: produce el valor inicial del bloque.
pub type InitFuture = Pin<Box<dyn Future<Output = Result<Value, CircuitError>> + Send>>;
/// Futuro de limpieza asíncrona en el apagado.
pub type StopFuture = Pin<Box<dyn Future<Output = Result<(), CircuitError>> + Send>>;
/// Tarea principal de un bloque (monitorizada por el supervisor).
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), CircuitError>> + Send>>;

/// Lógica de un bloque secuencial.
#[allow(unused_variables)]
pub trait SeqLogic: Send {
    /// Entrega síncrona de un evento tipado. El valor devuelto llega al
    /// emisor. `Err(UnknownEvent)` es la única falla no fatal.
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError>;

    /// Adquisición de recursos, antes de la inicialización.
    fn start(&mut self) -> Result<(), CircuitError> {
        Ok(())
    }

    /// Liberación de recursos; tolerante a un arranque parcial.
    fn stop(&mut self) {}

    /// Fase 3 de la secuencia de init (síncrona).
    fn init_regular(&mut self, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        Ok(())
    }

    /// Fases 2 y 4: aplica un valor inicial concreto.
    fn init_from_value(&mut self, value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError>;

    /// Specs de evento configurados internamente (p.ej. los canales
    /// `on_enter_*` de una FSM). La finalización los usa para validar
    /// destinos y auto-crear `_ctrl`.
    fn configured_events(&self) -> Vec<crate::event::EventSpec> {
        Vec::new()
    }

    // --- capacidad: persistencia ---

    /// Estado serializable a conservar entre reinicios; `None` si el bloque
    /// no tiene nada que guardar.
    fn save_state(&self) -> Option<Value> {
        None
    }

    /// Fase 1 de init: reconstruye el estado desde un registro guardado.
    /// Por defecto trata el registro como un valor inicial simple, con lo
    /// que `restore(save(s))` y `init_from_value(s)` coinciden.
    fn restore_state(&mut self, state: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        self.init_from_value(state, ctx)
    }

    // --- capacidad: asincronía ---

    fn init_async(&self) -> Option<InitFuture> {
        None
    }

    fn stop_async(&self) -> Option<StopFuture> {
        None
    }

    fn main_task(&self, handle: ControlHandle) -> Option<TaskFuture> {
        None
    }
}

/// Opt-in de persistencia de un bloque.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistConf {
    /// Un registro más viejo que esto se trata como ausente. `None` = sin
    /// caducidad.
    pub expiration: Option<Duration>,
}

/// Configuración de ciclo de vida de un bloque secuencial.
#[derive(Debug, Clone)]
pub(crate) struct SeqConf {
    pub initdef: Option<Value>,
    pub persist: Option<PersistConf>,
    pub init_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for SeqConf {
    fn default() -> Self {
        Self { initdef: None,
               persist: None,
               init_timeout: DEFAULT_INIT_TIMEOUT,
               stop_timeout: DEFAULT_STOP_TIMEOUT }
    }
}

//! Contexto entregado a los handlers de bloque.
//!
//! Los handlers no tocan el circuito directamente: registran efectos
//! (cambios de salida, eventos salientes, timers) que el motor aplica cuando
//! el handler retorna. Esto preserva el orden FIFO por bloque y hace
//! imposible que dos handlers del mismo bloque se solapen.

use std::time::Duration;

use serde_json::Value;

use crate::event::{EventData, EventSpec, EventType};

/// Efecto diferido producido por un handler.
#[derive(Debug)]
pub(crate) enum Effect {
    /// Nueva salida del bloque emisor (entra al motor de propagación).
    SetOutput { block: String, value: Value },
    /// Evento dirigido, despachado tras retornar el handler.
    Send {
        dest: String,
        etype: EventType,
        data: EventData,
    },
    /// Disparo de un spec configurado (pipeline de filtros incluido).
    FireSpec { spec: EventSpec, data: EventData },
    /// Programa el evento en la rueda de tiempo con la generación vigente
    /// del bloque emisor.
    ScheduleTimer {
        block: String,
        etype: EventType,
        data: EventData,
        after: Duration,
    },
    /// Invalida todos los timers pendientes del bloque (salto de generación).
    CancelTimers { block: String },
    /// Petición de apagado ordenado (bloque `_ctrl`).
    RequestShutdown,
    /// Petición de aborto con mensaje (bloque `_ctrl`).
    RequestAbort(String),
}

/// Colector de efectos de una invocación de handler.
pub struct BlockCtx {
    name: String,
    debug: bool,
    effects: Vec<Effect>,
}

impl BlockCtx {
    pub(crate) fn new(name: impl Into<String>, debug: bool) -> Self {
        Self { name: name.into(),
               debug,
               effects: Vec::new() }
    }

    /// Nombre del bloque dueño del handler en curso.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flag de debug por bloque (sembrado desde el entorno al arrancar).
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Registra la nueva salida del bloque. El commit real (detección de
    /// cambio, eventos de salida, ola de propagación) ocurre al retornar.
    pub fn set_output(&mut self, value: Value) {
        let block = self.name.clone();
        self.effects.push(Effect::SetOutput { block, value });
    }

    /// Encola un evento dirigido a otro bloque.
    pub fn send(&mut self, dest: impl Into<String>, etype: impl Into<EventType>, data: EventData) {
        self.effects.push(Effect::Send { dest: dest.into(),
                                         etype: etype.into(),
                                         data });
    }

    pub(crate) fn fire_spec(&mut self, spec: EventSpec, data: EventData) {
        self.effects.push(Effect::FireSpec { spec, data });
    }

    pub(crate) fn schedule_timer(&mut self, etype: EventType, data: EventData, after: Duration) {
        let block = self.name.clone();
        self.effects.push(Effect::ScheduleTimer { block, etype, data, after });
    }

    pub(crate) fn cancel_timers(&mut self) {
        let block = self.name.clone();
        self.effects.push(Effect::CancelTimers { block });
    }

    pub(crate) fn request_shutdown(&mut self) {
        self.effects.push(Effect::RequestShutdown);
    }

    pub(crate) fn request_abort(&mut self, message: String) {
        self.effects.push(Effect::RequestAbort(message));
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

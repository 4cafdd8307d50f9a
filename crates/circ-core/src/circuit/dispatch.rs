//! Despachador de eventos: entrega síncrona tipada con control de
//! reentrada.
//!
//! Algoritmo de `dispatch(dst, etype, data)`:
//! 1. resolver `Cond` por la veracidad de `data["value"]`; una rama ausente
//!    significa "ningún evento";
//! 2. checkout del destino: un slot vacío es reentrada (`RecursiveEvent`,
//!    fatal);
//! 3. el handler corre hasta completar; sus efectos (salidas, eventos,
//!    timers) se aplican después de reinsertar el bloque, preservando el
//!    FIFO por bloque;
//! 4. `UnknownEvent` se devuelve al emisor; cualquier otro error de handler
//!    aborta la simulación;
//! 5. el valor devuelto por el handler llega al emisor.

use log::{debug, warn};
use serde_json::Value;

use super::{BlockKind, CircuitState, ControlRequest};
use crate::block::ctx::{BlockCtx, Effect};
use crate::constants::EXTERNAL_SOURCE_PREFIX;
use crate::errors::CircuitError;
use crate::event::{is_truthy, is_valid_key, EventData, EventSpec, EventType};
use crate::runtime::timer::TimerGuard;

impl CircuitState {
    pub(crate) fn dispatch(&mut self, dst: &str, etype: &EventType, data: EventData) -> Result<Value, CircuitError> {
        // 1. Resolución de eventos condicionales (encadenables).
        let mut resolved = etype.clone();
        loop {
            match resolved {
                EventType::Cond { etrue, efalse } => {
                    let truthy = data.get("value").map(is_truthy).unwrap_or(false);
                    let side = if truthy { etrue } else { efalse };
                    match side {
                        Some(inner) => resolved = *inner,
                        None => return Ok(Value::Null),
                    }
                }
                _ => break,
            }
        }

        // 2. Checkout (guardia de reentrada).
        let mut entry = self.checkout(dst, &resolved.label())?;
        if self.debug || entry.core.debug {
            debug!("[{}] {dst}: event '{}' data {:?}", self.name, resolved.label(), data);
        }

        // 3. Handler.
        let mut data = data;
        let (result, effects) = match &mut entry.kind {
            BlockKind::Seq { logic, .. } => {
                let mut ctx = BlockCtx::new(dst, entry.core.debug);
                let r = logic.handle_event(&resolved, &mut data, &mut ctx);
                (r, ctx.into_effects())
            }
            BlockKind::Comb { .. } => (Err(CircuitError::UnknownEvent { block: dst.to_string(),
                                                                        event: resolved.label() }),
                                       Vec::new()),
        };
        self.restore(dst, entry);

        // 4./5. Efectos y propagación del resultado.
        match result {
            Ok(value) => {
                self.apply_effects(effects)?;
                Ok(value)
            }
            Err(e) if e.is_benign() => Err(e),
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Entrada pública para corutinas de I/O del host.
    pub(crate) fn external_send(&mut self, dst: &str, etype: &EventType, mut data: EventData) -> Result<Value, CircuitError> {
        if !self.ready {
            return Err(CircuitError::InvalidState("circuit is not ready for external events".into()));
        }
        let source = match data.get("source").and_then(|v| v.as_str()) {
            Some(s) if s.starts_with(EXTERNAL_SOURCE_PREFIX) => s.to_string(),
            Some(s) => format!("{EXTERNAL_SOURCE_PREFIX}{s}"),
            None => EXTERNAL_SOURCE_PREFIX.to_string(),
        };
        data.insert("source".to_string(), Value::String(source));
        self.dispatch(dst, etype, data)
    }

    /// Aplica los efectos registrados por un handler, en orden.
    pub(crate) fn apply_effects(&mut self, effects: Vec<Effect>) -> Result<(), CircuitError> {
        for effect in effects {
            match effect {
                Effect::SetOutput { block, value } => self.commit_output(&block, value)?,
                Effect::Send { dest, etype, data } => match self.dispatch(&dest, &etype, data) {
                    Ok(_) => {}
                    Err(e) if e.is_benign() => warn!("[{}] {e}", self.name),
                    Err(e) => return Err(e),
                },
                Effect::FireSpec { spec, data } => self.fire_spec(&spec, data)?,
                Effect::ScheduleTimer { block, etype, data, after } => {
                    let gen = self.timer_gen(&block);
                    self.wheel.schedule(after,
                                        block.clone(),
                                        etype,
                                        data,
                                        TimerGuard::BlockGen { block, gen });
                }
                Effect::CancelTimers { block } => {
                    *self.timer_gens.entry(block).or_insert(0) += 1;
                }
                Effect::RequestShutdown => self.control_reqs.push(ControlRequest::Shutdown),
                Effect::RequestAbort(message) => {
                    self.control_reqs.push(ControlRequest::Abort(CircuitError::Internal(message)));
                }
            }
        }
        Ok(())
    }

    /// Dispara un spec configurado: pipeline de filtros, entrega y
    /// programación de la repetición.
    pub(crate) fn fire_spec(&mut self, spec: &EventSpec, mut data: EventData) -> Result<(), CircuitError> {
        if spec.repeat.is_some() {
            data.insert("repeat".to_string(), Value::from(0u32));
        }
        let Some(fdata) = spec.apply_filters(data) else {
            return Ok(());
        };
        if let Some(bad) = fdata.keys().find(|k| !is_valid_key(k)) {
            warn!("[{}] event to '{}' dropped: filter produced invalid key '{bad}'", self.name, spec.dest);
            return Ok(());
        }

        match self.dispatch(&spec.dest, &spec.etype, fdata.clone()) {
            Ok(_) => {}
            Err(e) if e.is_benign() => {
                debug!("[{}] {e}", self.name);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if let Some(rep) = spec.repeat {
            // Cada disparo nuevo del spec invalida la cadena anterior.
            let gen = {
                let g = self.repeat_gens.entry(spec.id).or_insert(0);
                *g += 1;
                *g
            };
            self.wheel.schedule(rep.interval,
                                spec.dest.clone(),
                                spec.etype.clone(),
                                fdata,
                                TimerGuard::Repeat { spec: Box::new(spec.clone()),
                                                     gen,
                                                     n: 1 });
        }
        Ok(())
    }

    /// Entrega los eventos de salida de un bloque con las claves inyectadas
    /// por el motor.
    pub(crate) fn fire_output_specs(&mut self,
                                    source: &str,
                                    specs: &[EventSpec],
                                    previous: Option<Value>,
                                    value: Value)
                                    -> Result<(), CircuitError> {
        for spec in specs {
            let mut data = EventData::new();
            data.insert("source".to_string(), Value::String(source.to_string()));
            data.insert("trigger".to_string(), Value::String("output".to_string()));
            if let Some(prev) = &previous {
                // `previous` se omite (no null) cuando la salida anterior era
                // UNDEF; null es un valor legal.
                data.insert("previous".to_string(), prev.clone());
            }
            data.insert("value".to_string(), value.clone());
            self.fire_spec(spec, data)?;
        }
        Ok(())
    }

    /// Despacha todas las entradas vencidas de la rueda de tiempo.
    pub(crate) fn fire_due_timers(&mut self, now: tokio::time::Instant) -> Result<(), CircuitError> {
        while let Some(entry) = self.wheel.pop_due(now) {
            match entry.guard {
                TimerGuard::BlockGen { ref block, gen } => {
                    if self.timer_gen(block) != gen {
                        continue;
                    }
                    match self.dispatch(&entry.dest, &entry.etype, entry.data) {
                        Ok(_) => {}
                        Err(e) if e.is_benign() => debug!("[{}] {e}", self.name),
                        Err(e) => return Err(e),
                    }
                }
                TimerGuard::Repeat { ref spec, gen, n } => {
                    if self.repeat_gens.get(&spec.id).copied().unwrap_or(0) != gen {
                        continue;
                    }
                    let mut data = entry.data.clone();
                    data.insert("repeat".to_string(), Value::from(n));
                    match self.dispatch(&entry.dest, &entry.etype, data) {
                        Ok(_) => {}
                        Err(e) if e.is_benign() => debug!("[{}] {e}", self.name),
                        Err(e) => return Err(e),
                    }
                    let under_cap = spec.repeat
                                        .and_then(|r| r.count)
                                        .map(|count| n < count)
                                        .unwrap_or(spec.repeat.is_some());
                    if under_cap {
                        if let Some(rep) = spec.repeat {
                            self.wheel.schedule(rep.interval,
                                                entry.dest.clone(),
                                                entry.etype.clone(),
                                                entry.data,
                                                TimerGuard::Repeat { spec: spec.clone(),
                                                                     gen,
                                                                     n: n + 1 });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Extrae las peticiones de control pendientes (bloque `_ctrl`).
    pub(crate) fn take_control_requests(&mut self) -> Vec<ControlRequest> {
        std::mem::take(&mut self.control_reqs)
    }
}

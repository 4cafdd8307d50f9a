//! Motor de propagación: mantiene las salidas combinacionales consistentes
//! con sus entradas y acota el tiempo de propagación.
//!
//! Contrato de `commit_output`:
//! 1. valor sin cambio → no hay propagación, pero `on_every_output` dispara
//!    igualmente (`on_output` sólo ante cambio real, incluido el paso desde
//!    UNDEF);
//! 2. con cambio: se registra el valor y se encolan los consumidores aguas
//!    abajo en orden FIFO;
//! 3. los consumidores se reevalúan con `calc_output`; sus commits anidados
//!    entran a la misma cola (no hay recursión de olas);
//! 4. inestabilidad: un contador por bloque y por ola, con tope en el número
//!    de bloques del circuito; superarlo aborta con `Instability`.

use indexmap::IndexMap;

use serde_json::Value;

use super::{BlockKind, CircuitState, Wave};
use crate::block::comb::{InputSlot, InputValues, SlotValues};
use crate::block::Producer;
use crate::errors::CircuitError;

impl CircuitState {
    /// Registra una nueva salida y propaga. Punto de entrada único de toda
    /// escritura de `output`.
    pub(crate) fn commit_output(&mut self, name: &str, value: Value) -> Result<(), CircuitError> {
        let (changed, previous, on_output, on_every_output, consumers) = {
            let entry = self.entry_mut(name)?;
            let previous = entry.core.output.clone();
            let changed = previous.as_ref() != Some(&value);
            if changed {
                entry.core.output = Some(value.clone());
            }
            (changed,
             previous,
             entry.on_output.clone(),
             entry.on_every_output.clone(),
             entry.core.oconnections.iter().cloned().collect::<Vec<_>>())
        };

        if !changed {
            // Sin cambio no hay ola, pero los suscriptores de "cada commit"
            // se notifican igual.
            self.fire_output_specs(name, &on_every_output, previous, value)?;
            return Ok(());
        }

        if self.debug || self.entry(name)?.core.debug {
            log::debug!("[{}] {name}: output {:?} -> {:?}", self.name, previous, value);
        }

        let top = self.wave.is_none();
        if top {
            self.wave = Some(Wave::default());
        }
        if let Some(wave) = self.wave.as_mut() {
            wave.queue.extend(consumers);
        }

        let mut specs = on_output;
        specs.extend(on_every_output);
        let fired = self.fire_output_specs(name, &specs, previous, value);

        if top {
            let drained = fired.and_then(|_| self.drain_wave());
            self.wave = None;
            drained
        } else {
            fired
        }
    }

    /// Reevalúa consumidores en orden FIFO hasta que la ola se asienta.
    fn drain_wave(&mut self) -> Result<(), CircuitError> {
        loop {
            let next = match self.wave.as_mut() {
                Some(wave) => wave.queue.pop_front(),
                None => None,
            };
            let Some(name) = next else { break };

            let passes = match self.wave.as_mut() {
                Some(wave) => {
                    let c = wave.counts.entry(name.clone()).or_insert(0);
                    *c += 1;
                    *c
                }
                None => 0,
            };
            if passes > self.max_passes {
                let err = CircuitError::Instability { block: name,
                                                      limit: self.max_passes };
                self.fail(err.clone());
                return Err(err);
            }
            self.eval_comb(&name)?;
        }
        Ok(())
    }

    /// Evalúa un bloque combinacional con un snapshot consistente de sus
    /// entradas y commitea el resultado. Entradas con UNDEF dejan la salida
    /// tal cual (sólo ocurre durante la inicialización).
    pub(crate) fn eval_comb(&mut self, name: &str) -> Result<(), CircuitError> {
        let entry = self.checkout(name, "<eval>")
                        .map_err(|e| match e {
                            CircuitError::RecursiveEvent { block, .. } => {
                                CircuitError::Internal(format!("block '{block}' re-evaluated during its own handler"))
                            }
                            other => other,
                        })?;

        let result = match &entry.kind {
            BlockKind::Comb { logic, inputs } => match self.resolve_inputs(inputs) {
                Err(e) => Some(Err(e)),
                Ok(None) => None,
                Ok(Some(values)) => Some(logic.calc_output(&values)),
            },
            BlockKind::Seq { .. } => None,
        };
        self.restore(name, entry);

        match result {
            None => Ok(()),
            Some(Ok(value)) => self.commit_output(name, value),
            Some(Err(e)) => {
                let err = CircuitError::block(name, e);
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Snapshot de los valores de entrada; `None` si algún productor sigue
    /// en UNDEF.
    fn resolve_inputs(&self, inputs: &IndexMap<String, InputSlot>) -> Result<Option<InputValues>, CircuitError> {
        let mut slots = IndexMap::new();
        for (slot_name, slot) in inputs {
            let resolved = match slot {
                InputSlot::Single(p) => match self.producer_value(p)? {
                    None => return Ok(None),
                    Some(v) => SlotValues::Single(v),
                },
                InputSlot::Group(ps) => {
                    let mut vs = Vec::with_capacity(ps.len());
                    for p in ps {
                        match self.producer_value(p)? {
                            None => return Ok(None),
                            Some(v) => vs.push(v),
                        }
                    }
                    SlotValues::Group(vs)
                }
            };
            slots.insert(slot_name.clone(), resolved);
        }
        Ok(Some(InputValues::new(slots)))
    }

    fn producer_value(&self, p: &Producer) -> Result<Option<Value>, CircuitError> {
        match p {
            Producer::Const(v) => Ok(Some(v.clone())),
            Producer::Name(n) => self.output_of(n),
        }
    }

    /// Inicialización de la parte combinacional: evaluación bajo demanda en
    /// profundidad. Un ciclo combinacional se manifiesta aquí como
    /// `Instability` antes de terminar el arranque.
    pub(crate) fn ensure_comb_initialized(&mut self, name: &str, stack: &mut Vec<String>) -> Result<(), CircuitError> {
        if self.output_of(name)?.is_some() {
            return Ok(());
        }
        if stack.iter().any(|s| s == name) {
            let err = CircuitError::Instability { block: name.to_string(),
                                                  limit: self.max_passes };
            self.fail(err.clone());
            return Err(err);
        }
        stack.push(name.to_string());

        let producers: Vec<String> = {
            let entry = self.entry(name)?;
            match &entry.kind {
                BlockKind::Seq { .. } => Vec::new(),
                BlockKind::Comb { inputs, .. } => {
                    let mut names = Vec::new();
                    for slot in inputs.values() {
                        let ps: Box<dyn Iterator<Item = &Producer>> = match slot {
                            InputSlot::Single(p) => Box::new(std::iter::once(p)),
                            InputSlot::Group(ps) => Box::new(ps.iter()),
                        };
                        for p in ps {
                            if let Producer::Name(n) = p {
                                names.push(n.clone());
                            }
                        }
                    }
                    names
                }
            }
        };

        for p in producers {
            let is_comb = matches!(self.entry(&p)?.kind, BlockKind::Comb { .. });
            if is_comb && self.output_of(&p)?.is_none() {
                self.ensure_comb_initialized(&p, stack)?;
            }
        }

        self.eval_comb(name)?;
        stack.pop();
        Ok(())
    }
}

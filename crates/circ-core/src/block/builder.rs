//! Builders de registro de bloques.
//!
//! Un builder acumula la configuración del bloque (conexiones, eventos de
//! salida, persistencia, timeouts) y lo registra en un circuito concreto con
//! `register`. El registro sólo es válido antes de la finalización.

use indexmap::IndexMap;
use serde_json::Value;

use super::comb::{CombLogic, InputSlot};
use super::seq::{PersistConf, SeqConf, SeqLogic};
use super::Producer;
use crate::circuit::Circuit;
use crate::errors::CircuitError;
use crate::event::EventSpec;
use std::time::Duration;

/// Builder de un bloque combinacional.
pub struct CombBlockBuilder {
    pub(crate) name: String,
    pub(crate) comment: String,
    pub(crate) debug: bool,
    pub(crate) logic: Box<dyn CombLogic>,
    pub(crate) inputs: IndexMap<String, InputSlot>,
    pub(crate) on_output: Vec<EventSpec>,
    pub(crate) on_every_output: Vec<EventSpec>,
    dup_slot: Option<String>,
}

impl CombBlockBuilder {
    pub fn new(name: impl Into<String>, logic: impl CombLogic + 'static) -> Self {
        Self { name: name.into(),
               comment: String::new(),
               debug: false,
               logic: Box::new(logic),
               inputs: IndexMap::new(),
               on_output: Vec::new(),
               on_every_output: Vec::new(),
               dup_slot: None }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Conecta un slot único. Cada slot admite una sola conexión.
    pub fn input(mut self, slot: impl Into<String>, producer: impl Into<Producer>) -> Self {
        let slot = slot.into();
        if self.inputs.insert(slot.clone(), InputSlot::Single(producer.into())).is_some() {
            self.dup_slot = Some(slot);
        }
        self
    }

    /// Conecta un slot de grupo (tupla ordenada de productores).
    pub fn group(mut self, slot: impl Into<String>, producers: Vec<Producer>) -> Self {
        let slot = slot.into();
        if self.inputs.insert(slot.clone(), InputSlot::Group(producers)).is_some() {
            self.dup_slot = Some(slot);
        }
        self
    }

    pub fn on_output(mut self, spec: EventSpec) -> Self {
        self.on_output.push(spec);
        self
    }

    pub fn on_every_output(mut self, spec: EventSpec) -> Self {
        self.on_every_output.push(spec);
        self
    }

    /// Registra el bloque en el circuito. Falla con `InvalidState` si el
    /// circuito ya está finalizado o si un slot fue conectado dos veces.
    pub fn register(self, circuit: &Circuit) -> Result<(), CircuitError> {
        if let Some(slot) = &self.dup_slot {
            return Err(CircuitError::InvalidState(format!("block '{}': input slot '{slot}' connected twice", self.name)));
        }
        circuit.add_comb(self)
    }
}

/// Builder de un bloque secuencial.
pub struct SeqBlockBuilder {
    pub(crate) name: String,
    pub(crate) comment: String,
    pub(crate) debug: bool,
    pub(crate) logic: Box<dyn SeqLogic>,
    pub(crate) conf: SeqConf,
    pub(crate) on_output: Vec<EventSpec>,
    pub(crate) on_every_output: Vec<EventSpec>,
}

impl SeqBlockBuilder {
    pub fn new(name: impl Into<String>, logic: impl SeqLogic + 'static) -> Self {
        Self { name: name.into(),
               comment: String::new(),
               debug: false,
               logic: Box::new(logic),
               conf: SeqConf::default(),
               on_output: Vec::new(),
               on_every_output: Vec::new() }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Valor por defecto aplicado en la fase 4 de inicialización.
    pub fn initdef(mut self, value: impl Into<Value>) -> Self {
        self.conf.initdef = Some(value.into());
        self
    }

    /// Activa la persistencia del estado del bloque entre reinicios.
    pub fn persistent(mut self, expiration: Option<Duration>) -> Self {
        self.conf.persist = Some(PersistConf { expiration });
        self
    }

    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.conf.init_timeout = timeout;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.conf.stop_timeout = timeout;
        self
    }

    pub fn on_output(mut self, spec: EventSpec) -> Self {
        self.on_output.push(spec);
        self
    }

    pub fn on_every_output(mut self, spec: EventSpec) -> Self {
        self.on_every_output.push(spec);
        self
    }

    pub fn register(self, circuit: &Circuit) -> Result<(), CircuitError> {
        circuit.add_seq(self)
    }
}

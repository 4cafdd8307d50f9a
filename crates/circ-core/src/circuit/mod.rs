//! Registro del circuito y singleton de proceso.
//!
//! Rol:
//! - `Circuit` es el handle público (clonable) sobre el estado compartido;
//!   registra bloques, finaliza la estructura y expone lecturas de salida.
//! - `CircuitState` es el estado interno: registro de bloques por nombre,
//!   rueda de tiempo, generaciones de timers y error terminal. Todo el
//!   código de bloques corre dentro de la tarea de simulación, por lo que el
//!   mutex nunca se disputa durante el despacho.
//! - El slot de cada bloque es `Option<BlockEntry>`: se extrae ("checkout")
//!   mientras su handler corre. Un despacho hacia un slot vacío es
//!   exactamente la condición de reentrada prohibida.
//!
//! El singleton de proceso (`get_circuit`/`reset_circuit`) replica el patrón
//! de configuración global perezosa; los tests construyen circuitos
//! explícitos con `Circuit::new` para no acoplarse al global.

pub mod dispatch;
pub mod propagate;
pub mod resolver;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use log::info;
use once_cell::sync::Lazy;
use serde_json::Value;
use uuid::Uuid;

use crate::block::builder::{CombBlockBuilder, SeqBlockBuilder};
use crate::block::comb::{CombLogic, InputSlot};
use crate::block::core::BlockCore;
use crate::block::seq::{SeqConf, SeqLogic};
use crate::block::BlockKindTag;
use crate::constants::{ENGINE_VERSION, INTERNAL_PREFIX};
use crate::errors::CircuitError;
use crate::event::EventSpec;
use crate::persist::StateStore;
use crate::runtime::timer::TimerWheel;
use crate::runtime::ControlHandle;

/// Variante de un bloque registrado.
pub(crate) enum BlockKind {
    Comb {
        logic: Box<dyn CombLogic>,
        inputs: IndexMap<String, InputSlot>,
    },
    Seq {
        logic: Box<dyn SeqLogic>,
        conf: SeqConf,
    },
}

/// Entrada del registro: núcleo + variante + eventos de salida configurados.
pub(crate) struct BlockEntry {
    pub core: BlockCore,
    pub kind: BlockKind,
    pub on_output: Vec<EventSpec>,
    pub on_every_output: Vec<EventSpec>,
    pub started: bool,
}

impl BlockEntry {
    pub fn tag(&self) -> BlockKindTag {
        match self.kind {
            BlockKind::Comb { .. } => BlockKindTag::Comb,
            BlockKind::Seq { .. } => BlockKindTag::Seq,
        }
    }
}

/// Petición de control emitida desde dentro del circuito (`_ctrl`).
#[derive(Debug, Clone)]
pub(crate) enum ControlRequest {
    Shutdown,
    Abort(CircuitError),
}

/// Ola de propagación en curso (sólo existe dentro de un commit top-level).
#[derive(Default)]
pub(crate) struct Wave {
    pub queue: std::collections::VecDeque<String>,
    pub counts: HashMap<String, u32>,
}

pub(crate) struct CircuitState {
    pub name: String,
    pub run_id: Uuid,
    /// Trazas de depuración a nivel de circuito.
    pub debug: bool,
    pub blocks: IndexMap<String, Option<BlockEntry>>,
    pub finalized: bool,
    pub ready: bool,
    pub terminal: bool,
    pub max_passes: u32,
    pub wave: Option<Wave>,
    pub wheel: TimerWheel,
    /// Generación vigente de timers por bloque; un salto invalida las
    /// entradas pendientes sin tocar el heap.
    pub timer_gens: HashMap<String, u64>,
    /// Generación de repetición por `EventSpec`.
    pub repeat_gens: HashMap<u64, u64>,
    pub error: Option<CircuitError>,
    pub control_reqs: Vec<ControlRequest>,
    pub store: Option<Box<dyn StateStore>>,
    /// Resoluciones por nombre pedidas por terceros, validadas al finalizar.
    pub required: Vec<(String, BlockKindTag)>,
    pub ctl: Option<ControlHandle>,
}

impl CircuitState {
    fn new(name: String) -> Self {
        Self { name,
               run_id: Uuid::new_v4(),
               debug: false,
               blocks: IndexMap::new(),
               finalized: false,
               ready: false,
               terminal: false,
               max_passes: 1,
               wave: None,
               wheel: TimerWheel::new(),
               timer_gens: HashMap::new(),
               repeat_gens: HashMap::new(),
               error: None,
               control_reqs: Vec::new(),
               store: None,
               required: Vec::new(),
               ctl: None }
    }

    pub(crate) fn add_entry(&mut self, entry: BlockEntry) -> Result<(), CircuitError> {
        if self.finalized {
            return Err(CircuitError::InvalidState(format!("cannot add block '{}' to a finalized circuit",
                                                          entry.core.name)));
        }
        let name = entry.core.name.clone();
        if name.is_empty() {
            return Err(CircuitError::InvalidState("block name must not be empty".into()));
        }
        if self.blocks.contains_key(&name) {
            return Err(CircuitError::InvalidState(format!("duplicate block name '{name}'")));
        }
        self.blocks.insert(name, Some(entry));
        Ok(())
    }

    /// Extrae el bloque para correr su handler. `Err` = slot vacío, es decir
    /// reentrada.
    pub(crate) fn checkout(&mut self, name: &str, event: &str) -> Result<BlockEntry, CircuitError> {
        match self.blocks.get_mut(name) {
            None => Err(CircuitError::NotFound(name.to_string())),
            Some(slot) => slot.take().ok_or_else(|| CircuitError::RecursiveEvent { block: name.to_string(),
                                                                                   event: event.to_string() }),
        }
    }

    pub(crate) fn restore(&mut self, name: &str, entry: BlockEntry) {
        if let Some(slot) = self.blocks.get_mut(name) {
            *slot = Some(entry);
        }
    }

    pub(crate) fn entry(&self, name: &str) -> Result<&BlockEntry, CircuitError> {
        match self.blocks.get(name) {
            None => Err(CircuitError::NotFound(name.to_string())),
            Some(slot) => slot.as_ref()
                              .ok_or_else(|| CircuitError::Internal(format!("block '{name}' accessed while handling an event"))),
        }
    }

    pub(crate) fn entry_mut(&mut self, name: &str) -> Result<&mut BlockEntry, CircuitError> {
        match self.blocks.get_mut(name) {
            None => Err(CircuitError::NotFound(name.to_string())),
            Some(slot) => slot.as_mut()
                              .ok_or_else(|| CircuitError::Internal(format!("block '{name}' accessed while handling an event"))),
        }
    }

    /// Salida actual de un bloque o constante de productor.
    pub(crate) fn output_of(&self, name: &str) -> Result<Option<Value>, CircuitError> {
        Ok(self.entry(name)?.core.output.clone())
    }

    /// Registra el primer error fatal; los siguientes se ignoran.
    pub(crate) fn fail(&mut self, err: CircuitError) {
        if self.error.is_none() {
            log::error!("[{}] simulation error: {err}", self.name);
            self.error = Some(err);
        }
    }

    pub(crate) fn timer_gen(&self, block: &str) -> u64 {
        self.timer_gens.get(block).copied().unwrap_or(0)
    }

    /// Vuelca el estado de los bloques con persistencia activada. Los fallos
    /// de escritura se registran y no interrumpen la limpieza.
    pub(crate) fn flush_persistent(&mut self) {
        if self.store.is_none() {
            return;
        }
        let mut records: Vec<(String, Vec<u8>)> = Vec::new();
        for (name, slot) in &self.blocks {
            let Some(entry) = slot.as_ref() else { continue };
            if let BlockKind::Seq { logic, conf } = &entry.kind {
                if conf.persist.is_none() {
                    continue;
                }
                if let Some(state) = logic.save_state() {
                    match serde_json::to_vec(&state) {
                        Ok(bytes) => records.push((name.clone(), bytes)),
                        Err(e) => log::warn!("[{}] cannot serialize state of '{name}': {e}", self.name),
                    }
                }
            }
        }
        if let Some(store) = self.store.as_mut() {
            for (name, bytes) in records {
                if let Err(e) = store.put(&name, &bytes) {
                    log::warn!("cannot persist state of '{name}': {e}");
                }
            }
        }
    }
}

/// Handle público del circuito. Clonar es barato; todos los clones apuntan
/// al mismo estado.
#[derive(Clone)]
pub struct Circuit {
    inner: Arc<Mutex<CircuitState>>,
}

impl Circuit {
    pub fn new() -> Self {
        Self::named("circuit")
    }

    pub fn named(name: impl Into<String>) -> Self {
        let state = CircuitState::new(name.into());
        info!("[{}] new circuit (engine {ENGINE_VERSION}, run {})", state.name, state.run_id);
        Self { inner: Arc::new(Mutex::new(state)) }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CircuitState> {
        // El estado nunca queda inconsistente tras un panic de handler: la
        // simulación entera se descarta, así que el envenenamiento se ignora.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Activa trazas de depuración del circuito completo.
    pub fn set_debug(&self, debug: bool) {
        self.lock().debug = debug;
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// `true` cuando la simulación terminó y el circuito ya no puede
    /// reiniciarse.
    pub fn is_terminal(&self) -> bool {
        self.lock().terminal
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().blocks.contains_key(name)
    }

    /// Busca un bloque registrado; `NotFound` si no existe.
    pub fn find_block(&self, name: &str) -> Result<(), CircuitError> {
        let st = self.lock();
        if st.blocks.contains_key(name) {
            Ok(())
        } else {
            Err(CircuitError::NotFound(name.to_string()))
        }
    }

    /// Snapshot de la salida de un bloque (`None` = UNDEF).
    pub fn output(&self, name: &str) -> Result<Option<Value>, CircuitError> {
        self.lock().output_of(name)
    }

    pub fn block_names(&self) -> Vec<String> {
        self.lock().blocks.keys().cloned().collect()
    }

    /// Declara que un tercero referencia `name` y exige una clase de bloque;
    /// la existencia y el tipo se validan en la finalización.
    pub fn require_block(&self, name: impl Into<String>, kind: BlockKindTag) {
        self.lock().required.push((name.into(), kind));
    }

    /// Valida inmediatamente nombre y clase (circuito ya finalizado).
    pub fn resolve_name(&self, name: &str, kind: BlockKindTag) -> Result<(), CircuitError> {
        let st = self.lock();
        resolver::check_required(&st, name, kind)
    }

    /// Backend de persistencia usado por las fases de init/stop.
    pub fn set_state_store(&self, store: Box<dyn StateStore>) {
        self.lock().store = Some(store);
    }

    pub fn error(&self) -> Option<CircuitError> {
        self.lock().error.clone()
    }

    /// Handle de control de la simulación en marcha, si la hay.
    pub fn control_handle(&self) -> Option<ControlHandle> {
        self.lock().ctl.clone()
    }

    pub(crate) fn add_comb(&self, b: CombBlockBuilder) -> Result<(), CircuitError> {
        let mut st = self.lock();
        validate_user_name(&b.name)?;
        st.add_entry(BlockEntry { core: BlockCore::new(b.name, b.comment, b.debug),
                                  kind: BlockKind::Comb { logic: b.logic,
                                                          inputs: b.inputs },
                                  on_output: b.on_output,
                                  on_every_output: b.on_every_output,
                                  started: false })
    }

    pub(crate) fn add_seq(&self, b: SeqBlockBuilder) -> Result<(), CircuitError> {
        let mut st = self.lock();
        validate_user_name(&b.name)?;
        st.add_entry(BlockEntry { core: BlockCore::new(b.name, b.comment, b.debug),
                                  kind: BlockKind::Seq { logic: b.logic,
                                                         conf: b.conf },
                                  on_output: b.on_output,
                                  on_every_output: b.on_every_output,
                                  started: false })
    }

    /// Finaliza la estructura del circuito (idempotente). Ver `resolver`.
    pub fn finalize(&self) -> Result<(), CircuitError> {
        let mut st = self.lock();
        resolver::finalize(&mut st)
    }
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_user_name(name: &str) -> Result<(), CircuitError> {
    if name.starts_with(INTERNAL_PREFIX) {
        return Err(CircuitError::InvalidState(format!("block name '{name}' uses the reserved '_' prefix")));
    }
    Ok(())
}

// --- singleton de proceso ---

static CURRENT: Lazy<Mutex<Option<Circuit>>> = Lazy::new(|| Mutex::new(None));

/// Devuelve el circuito vigente del proceso, creándolo si no existe.
pub fn get_circuit() -> Circuit {
    let mut cur = CURRENT.lock().unwrap_or_else(PoisonError::into_inner);
    cur.get_or_insert_with(Circuit::new).clone()
}

/// Aborta la simulación en curso (cancelación), espera su limpieza y deja un
/// circuito nuevo y vacío. No puede llamarse desde la tarea de simulación ni
/// desde una tarea de bloque; la alternativa documentada y preferida es
/// reiniciar el proceso.
pub async fn reset_circuit() -> Result<(), CircuitError> {
    crate::runtime::ensure_outside_simulation("reset_circuit")?;
    let previous = {
        let mut cur = CURRENT.lock().unwrap_or_else(PoisonError::into_inner);
        cur.replace(Circuit::new())
    };
    if let Some(circuit) = previous {
        let ctl = circuit.lock().ctl.clone();
        if let Some(ctl) = ctl {
            ctl.abort(CircuitError::Cancelled("circuit reset".into()));
            let _ = ctl.join().await;
        }
    }
    Ok(())
}

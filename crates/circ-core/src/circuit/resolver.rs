//! Finalización: resolución de nombres, inversores implícitos y conexiones
//! inversas.
//!
//! La finalización es monótona e idempotente: tras el primer `finalize`
//! exitoso la estructura queda congelada y cualquier mutación estructural
//! falla con `InvalidState`. Pasos, en orden:
//! 1. crear `_ctrl` si algún spec de evento lo referencia;
//! 2. crear un inversor por cada referencia `_not_X` cuyo objetivo `X`
//!    exista y no empiece por `_` (nunca se crean inversores dobles);
//! 3. validar que toda referencia de productor y todo destino de evento
//!    resuelven a un bloque registrado del tipo correcto;
//! 4. poblar las conexiones inversas (`iconnections`/`oconnections`).

use std::collections::BTreeSet;

use indexmap::IndexMap;
use log::debug;

use super::{BlockEntry, BlockKind, CircuitState};
use crate::block::comb::InputSlot;
use crate::block::control::ControlBlock;
use crate::block::core::BlockCore;
use crate::block::invert::Invert;
use crate::block::seq::SeqConf;
use crate::block::{BlockKindTag, Producer};
use crate::constants::{CTRL_BLOCK, INTERNAL_PREFIX, NOT_PREFIX};
use crate::errors::CircuitError;

pub(crate) fn finalize(st: &mut CircuitState) -> Result<(), CircuitError> {
    if st.finalized {
        return Ok(());
    }
    if st.terminal {
        return Err(CircuitError::InvalidState("circuit already stopped; reset and rebuild".into()));
    }

    create_ctrl_if_referenced(st);
    create_inverters(st)?;
    resolve_references(st)?;
    populate_connections(st)?;
    check_required_all(st)?;

    st.max_passes = st.blocks.len().max(1) as u32;
    st.finalized = true;
    debug!("[{}] finalized: {} blocks, max passes {}", st.name, st.blocks.len(), st.max_passes);
    Ok(())
}

/// Destinos de evento configurados en cualquier canal de un bloque.
fn event_dests(entry: &BlockEntry) -> Vec<String> {
    let mut dests: Vec<String> = entry.on_output
                                      .iter()
                                      .chain(entry.on_every_output.iter())
                                      .map(|s| s.dest.clone())
                                      .collect();
    if let BlockKind::Seq { logic, .. } = &entry.kind {
        dests.extend(logic.configured_events().into_iter().map(|s| s.dest));
    }
    dests
}

fn create_ctrl_if_referenced(st: &mut CircuitState) {
    if st.blocks.contains_key(CTRL_BLOCK) {
        return;
    }
    let referenced = st.blocks
                       .values()
                       .flatten()
                       .any(|e| event_dests(e).iter().any(|d| d == CTRL_BLOCK));
    if referenced {
        debug!("[{}] auto-creating control block '{CTRL_BLOCK}'", st.name);
        let entry = BlockEntry { core: BlockCore::new(CTRL_BLOCK.to_string(), "internal control block".into(), false),
                                 kind: BlockKind::Seq { logic: Box::new(ControlBlock),
                                                        conf: SeqConf::default() },
                                 on_output: Vec::new(),
                                 on_every_output: Vec::new(),
                                 started: false };
        st.blocks.insert(CTRL_BLOCK.to_string(), Some(entry));
    }
}

/// Nombres `_not_X` referenciados desde slots de entrada o resoluciones
/// externas pedidas con `require_block`.
fn referenced_not_names(st: &CircuitState) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for entry in st.blocks.values().flatten() {
        if let BlockKind::Comb { inputs, .. } = &entry.kind {
            for slot in inputs.values() {
                let producers: Box<dyn Iterator<Item = &Producer>> = match slot {
                    InputSlot::Single(p) => Box::new(std::iter::once(p)),
                    InputSlot::Group(ps) => Box::new(ps.iter()),
                };
                for p in producers {
                    if let Producer::Name(n) = p {
                        if n.starts_with(NOT_PREFIX) {
                            names.insert(n.clone());
                        }
                    }
                }
            }
        }
    }
    for (name, _) in &st.required {
        if name.starts_with(NOT_PREFIX) {
            names.insert(name.clone());
        }
    }
    names
}

fn create_inverters(st: &mut CircuitState) -> Result<(), CircuitError> {
    for not_name in referenced_not_names(st) {
        if st.blocks.contains_key(&not_name) {
            // Una sola instancia por objetivo, da igual cuántas referencias.
            continue;
        }
        let target = &not_name[NOT_PREFIX.len()..];
        // El objetivo debe existir y no ser interno: `_not__not_X` nunca
        // crea un inversor doble.
        if target.starts_with(INTERNAL_PREFIX) || !st.blocks.contains_key(target) {
            continue;
        }
        debug!("[{}] auto-creating inverter '{not_name}'", st.name);
        let mut inputs = IndexMap::new();
        inputs.insert("in".to_string(), InputSlot::Single(Producer::Name(target.to_string())));
        let entry = BlockEntry { core: BlockCore::new(not_name.clone(), format!("inverter of '{target}'"), false),
                                 kind: BlockKind::Comb { logic: Box::new(Invert),
                                                         inputs },
                                 on_output: Vec::new(),
                                 on_every_output: Vec::new(),
                                 started: false };
        st.blocks.insert(not_name, Some(entry));
    }
    Ok(())
}

/// Toda referencia por nombre debe resolver a un bloque registrado; los
/// destinos de evento deben ser bloques secuenciales.
fn resolve_references(st: &CircuitState) -> Result<(), CircuitError> {
    for entry in st.blocks.values().flatten() {
        if let BlockKind::Comb { inputs, .. } = &entry.kind {
            for slot in inputs.values() {
                let producers: Box<dyn Iterator<Item = &Producer>> = match slot {
                    InputSlot::Single(p) => Box::new(std::iter::once(p)),
                    InputSlot::Group(ps) => Box::new(ps.iter()),
                };
                for p in producers {
                    if let Producer::Name(n) = p {
                        if !st.blocks.contains_key(n) {
                            return Err(CircuitError::NotFound(n.clone()));
                        }
                    }
                }
            }
        }
        for dest in event_dests(entry) {
            match st.blocks.get(&dest) {
                None => return Err(CircuitError::NotFound(dest)),
                Some(slot) => {
                    if let Some(e) = slot.as_ref() {
                        if !matches!(e.kind, BlockKind::Seq { .. }) {
                            return Err(CircuitError::TypeMismatch { name: dest,
                                                                    expected: BlockKindTag::Seq.to_string() });
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn populate_connections(st: &mut CircuitState) -> Result<(), CircuitError> {
    // (consumidor, productor) por cada referencia con nombre.
    let mut edges: Vec<(String, String)> = Vec::new();
    for (name, slot) in &st.blocks {
        let Some(entry) = slot.as_ref() else { continue };
        if let BlockKind::Comb { inputs, .. } = &entry.kind {
            for islot in inputs.values() {
                let producers: Box<dyn Iterator<Item = &Producer>> = match islot {
                    InputSlot::Single(p) => Box::new(std::iter::once(p)),
                    InputSlot::Group(ps) => Box::new(ps.iter()),
                };
                for p in producers {
                    if let Producer::Name(n) = p {
                        edges.push((name.clone(), n.clone()));
                    }
                }
            }
        }
    }
    for (consumer, producer) in edges {
        st.entry_mut(&producer)?.core.oconnections.insert(consumer.clone());
        st.entry_mut(&consumer)?.core.iconnections.insert(producer);
    }
    Ok(())
}

pub(crate) fn check_required(st: &CircuitState, name: &str, kind: BlockKindTag) -> Result<(), CircuitError> {
    match st.blocks.get(name) {
        None => Err(CircuitError::NotFound(name.to_string())),
        Some(slot) => {
            let matches = match (slot.as_ref(), kind) {
                (_, BlockKindTag::Any) => true,
                (Some(e), k) => e.tag() == k,
                // Bloque en checkout: el registro garantiza que existe.
                (None, _) => true,
            };
            if matches {
                Ok(())
            } else {
                Err(CircuitError::TypeMismatch { name: name.to_string(),
                                                 expected: kind.to_string() })
            }
        }
    }
}

fn check_required_all(st: &CircuitState) -> Result<(), CircuitError> {
    for (name, kind) in &st.required {
        check_required(st, name, *kind)?;
    }
    Ok(())
}

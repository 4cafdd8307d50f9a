//! Secuenciador de arranque y apagado del circuito.
//!
//! Arranque: finalizar → marcar listo para eventos externos → `start` de
//! cada bloque → inicialización en cuatro fases → bucle principal.
//!
//! Fases de inicialización por bloque secuencial, en orden fijo, deteniéndose
//! en cuanto la salida deja de ser UNDEF:
//! 1. datos persistentes (registro no caducado → `restore_state`);
//! 2. init asíncrono (`init_async`, concurrente entre bloques, timeout por
//!    bloque; el valor sólo se aplica si el bloque sigue sin inicializar);
//! 3. init regular síncrono;
//! 4. valor por defecto (`initdef` → `init_from_value`).
//! Si las cuatro dejan UNDEF, el arranque falla con `InitializationFailed`.
//!
//! Apagado (mejor esfuerzo, inverso): cancelar tareas monitorizadas →
//! `stop_async` con timeout por bloque → `stop` de los bloques arrancados →
//! volcado del estado persistente → marcar el circuito terminal.

use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinSet;

use crate::block::ctx::BlockCtx;
use crate::block::seq::{InitFuture, SeqLogic, StopFuture};
use crate::circuit::{BlockKind, Circuit, CircuitState};
use crate::errors::CircuitError;
use crate::persist::is_expired;
use crate::runtime::ControlHandle;

/// Corre una fase síncrona de la lógica secuencial de un bloque y aplica sus
/// efectos. El checkout garantiza que ningún evento se cuele en medio.
fn with_seq_logic<F>(st: &mut CircuitState, name: &str, phase: &str, f: F) -> Result<(), CircuitError>
    where F: FnOnce(&mut dyn SeqLogic, &mut BlockCtx) -> Result<(), CircuitError>
{
    let mut entry = st.checkout(name, phase)?;
    let (result, effects) = match &mut entry.kind {
        BlockKind::Seq { logic, .. } => {
            let mut ctx = BlockCtx::new(name, entry.core.debug);
            let r = f(logic.as_mut(), &mut ctx);
            (r, ctx.into_effects())
        }
        BlockKind::Comb { .. } => (Ok(()), Vec::new()),
    };
    st.restore(name, entry);
    match result {
        Ok(()) => st.apply_effects(effects),
        Err(e) => {
            let err = CircuitError::block(name, e);
            st.fail(err.clone());
            Err(err)
        }
    }
}

fn seq_block_names(st: &CircuitState) -> Vec<String> {
    st.blocks
      .iter()
      .filter(|(_, slot)| matches!(slot.as_ref().map(|e| &e.kind), Some(BlockKind::Seq { .. })))
      .map(|(name, _)| name.clone())
      .collect()
}

fn comb_block_names(st: &CircuitState) -> Vec<String> {
    st.blocks
      .iter()
      .filter(|(_, slot)| matches!(slot.as_ref().map(|e| &e.kind), Some(BlockKind::Comb { .. })))
      .map(|(name, _)| name.clone())
      .collect()
}

pub(crate) async fn start_sequence(circuit: &Circuit, handle: &ControlHandle) -> Result<(), CircuitError> {
    // 1./2. Finalización + listo para eventos externos.
    {
        let mut st = circuit.lock();
        crate::circuit::resolver::finalize(&mut st)?;
        crate::debug::apply_debug_env(&mut st);
        st.ready = true;
        info!("[{}] starting {} blocks", st.name, st.blocks.len());
    }

    // 3. Hook `start` de cada bloque, en orden de registro.
    let names = circuit.block_names();
    {
        let mut st = circuit.lock();
        for name in &names {
            let result = {
                let entry = st.entry_mut(name)?;
                match &mut entry.kind {
                    BlockKind::Comb { logic, .. } => logic.start(),
                    BlockKind::Seq { logic, .. } => logic.start(),
                }
            };
            match result {
                Ok(()) => st.entry_mut(name)?.started = true,
                Err(e) => {
                    let err = CircuitError::block(name, e);
                    st.fail(err.clone());
                    return Err(err);
                }
            }
        }
    }

    // 4. Cuatro fases de inicialización.
    init_sequence(circuit).await?;

    // Tareas principales de bloque, monitorizadas como servicios.
    let tasks: Vec<(String, crate::block::seq::TaskFuture)> = {
        let st = circuit.lock();
        let mut tasks = Vec::new();
        for name in seq_block_names(&st) {
            if let BlockKind::Seq { logic, .. } = &st.entry(&name)?.kind {
                if let Some(fut) = logic.main_task(handle.clone()) {
                    tasks.push((name, fut));
                }
            }
        }
        tasks
    };
    for (name, fut) in tasks {
        handle.spawn_monitored(format!("maintask:{name}"), true, fut);
    }
    Ok(())
}

async fn init_sequence(circuit: &Circuit) -> Result<(), CircuitError> {
    // Fase 1: restauración desde el almacén persistente.
    {
        let mut st = circuit.lock();
        for name in seq_block_names(&st) {
            restore_from_store(&mut st, &name)?;
        }
    }

    // Fase 2: init asíncrono concurrente; la espera total es el máximo de
    // los timeouts individuales.
    let pending: Vec<(String, InitFuture, Duration)> = {
        let st = circuit.lock();
        let mut pending = Vec::new();
        for name in seq_block_names(&st) {
            let entry = st.entry(&name)?;
            if entry.core.output.is_some() {
                continue;
            }
            if let BlockKind::Seq { logic, conf } = &entry.kind {
                if let Some(fut) = logic.init_async() {
                    pending.push((name.clone(), fut, conf.init_timeout));
                }
            }
        }
        pending
    };
    if !pending.is_empty() {
        let mut set = JoinSet::new();
        for (name, fut, timeout) in pending {
            set.spawn(async move {
                let outcome = tokio::time::timeout(timeout, fut).await;
                (name, outcome)
            });
        }
        while let Some(joined) = set.join_next().await {
            let (name, outcome) = joined.map_err(|e| CircuitError::Internal(format!("async init task failed: {e}")))?;
            match outcome {
                Err(_) => warn!("init_async of block '{name}' timed out"),
                Ok(Err(e)) => {
                    let mut st = circuit.lock();
                    let err = CircuitError::block(&name, e);
                    st.fail(err.clone());
                    return Err(err);
                }
                Ok(Ok(value)) => {
                    let mut st = circuit.lock();
                    // Regla de carrera: si un evento ya inicializó el bloque
                    // mientras tanto, el valor calculado se descarta.
                    if st.entry(&name)?.core.output.is_none() {
                        with_seq_logic(&mut st, &name, "<init-async>", |logic, ctx| logic.init_from_value(value, ctx))?;
                    }
                }
            }
        }
    }

    // Fases 3 y 4: init regular y valor por defecto.
    {
        let mut st = circuit.lock();
        for name in seq_block_names(&st) {
            if st.entry(&name)?.core.output.is_none() {
                with_seq_logic(&mut st, &name, "<init>", |logic, ctx| logic.init_regular(ctx))?;
            }
            if st.entry(&name)?.core.output.is_none() {
                let initdef = match &st.entry(&name)?.kind {
                    BlockKind::Seq { conf, .. } => conf.initdef.clone(),
                    BlockKind::Comb { .. } => None,
                };
                if let Some(value) = initdef {
                    with_seq_logic(&mut st, &name, "<initdef>", |logic, ctx| logic.init_from_value(value, ctx))?;
                }
            }
        }
    }

    // Parte combinacional: evaluación bajo demanda (un ciclo combinacional
    // aborta aquí con `Instability`).
    {
        let mut st = circuit.lock();
        for name in comb_block_names(&st) {
            let mut stack = Vec::new();
            st.ensure_comb_initialized(&name, &mut stack)?;
        }
    }

    // Invariante de arranque: ningún bloque queda en UNDEF.
    {
        let mut st = circuit.lock();
        let undefined = st.blocks
                          .iter()
                          .find(|(_, slot)| slot.as_ref().map(|e| e.core.output.is_none()).unwrap_or(false))
                          .map(|(name, _)| name.clone());
        if let Some(name) = undefined {
            let err = CircuitError::InitializationFailed(name);
            st.fail(err.clone());
            return Err(err);
        }
        info!("[{}] all blocks initialized", st.name);
    }
    Ok(())
}

fn restore_from_store(st: &mut CircuitState, name: &str) -> Result<(), CircuitError> {
    let expiration = match &st.entry(name)?.kind {
        BlockKind::Seq { conf, .. } => match &conf.persist {
            Some(p) => p.expiration,
            None => return Ok(()),
        },
        BlockKind::Comb { .. } => return Ok(()),
    };
    let record = match &st.store {
        None => return Ok(()),
        Some(store) => store.get(name)?,
    };
    let Some(record) = record else {
        return Ok(());
    };
    if is_expired(&record, expiration, name) {
        if let Some(store) = st.store.as_mut() {
            let _ = store.delete(name);
        }
        return Ok(());
    }
    let value: serde_json::Value = match serde_json::from_slice(&record.payload) {
        Ok(v) => v,
        Err(e) => {
            warn!("persistent state of '{name}' is unreadable, ignoring: {e}");
            return Ok(());
        }
    };
    with_seq_logic(st, name, "<restore>", |logic, ctx| logic.restore_state(value, ctx))
}

pub(crate) async fn stop_sequence(circuit: &Circuit, handle: &ControlHandle) {
    // 1. Tareas monitorizadas fuera.
    handle.cancel_monitored().await;

    // 2. `stop_async` concurrente; un timeout se registra y no bloquea el
    // resto de la limpieza.
    let stops: Vec<(String, StopFuture, Duration)> = {
        let st = circuit.lock();
        let mut stops = Vec::new();
        for name in seq_block_names(&st) {
            let Ok(entry) = st.entry(&name) else { continue };
            if !entry.started {
                continue;
            }
            if let BlockKind::Seq { logic, conf } = &entry.kind {
                if let Some(fut) = logic.stop_async() {
                    stops.push((name.clone(), fut, conf.stop_timeout));
                }
            }
        }
        stops
    };
    if !stops.is_empty() {
        let mut set = JoinSet::new();
        for (name, fut, timeout) in stops {
            set.spawn(async move {
                let outcome = tokio::time::timeout(timeout, fut).await;
                (name, outcome)
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Err(e) => warn!("stop_async task failed: {e}"),
                Ok((name, Err(_))) => warn!("stop_async of block '{name}' timed out"),
                Ok((name, Ok(Err(e)))) => warn!("stop_async of block '{name}' failed: {e}"),
                Ok((_, Ok(Ok(())))) => {}
            }
        }
    }

    // 3. Hook `stop` en orden inverso de registro, sólo bloques arrancados.
    {
        let mut st = circuit.lock();
        let names: Vec<String> = st.blocks.keys().rev().cloned().collect();
        for name in names {
            if let Some(Some(entry)) = st.blocks.get_mut(&name) {
                if entry.started {
                    match &mut entry.kind {
                        BlockKind::Comb { logic, .. } => logic.stop(),
                        BlockKind::Seq { logic, .. } => logic.stop(),
                    }
                }
            }
        }
    }

    // 4./5. Estado persistente + circuito terminal.
    {
        let mut st = circuit.lock();
        st.flush_persistent();
        st.wheel.clear();
        st.ready = false;
        st.terminal = true;
        info!("[{}] circuit stopped", st.name);
    }
}

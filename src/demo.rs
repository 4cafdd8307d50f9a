//! Circuito demo: control de una bomba de llenado.
//!
//! Cableado:
//! - `level` (entrada de valores) recibe el nivel simulado del depósito.
//! - `high` (comparador) marca cuando el nivel alcanza el umbral.
//! - Su `on_output` envía un evento condicional a la FSM `pump`: `start`
//!   cuando el nivel es alto, `stop` cuando deja de serlo.
//! - `pump` pasa por `cooldown` (estado temporizado) antes de volver a
//!   quedar disponible; un `start` durante el cooldown se rechaza.
//! - `starts` cuenta los arranques de la bomba y persiste entre reinicios.
//! - `monitor` refleja el estado de la bomba hacia el exterior.

use std::time::Duration;

use circ_blocks::{Compare, Counter, OutputFunc, ValueInput};
use circ_core::fsm::{Automaton, Fsm, States, TimerDef, TimerEventDef, Transition};
use circ_core::{Circuit, CircuitError, CombBlockBuilder, EventSpec, EventType, SeqBlockBuilder};
use serde_json::Value;

/// Autómata de la bomba: marcha, paro y un cooldown temporizado que evita
/// rearranques inmediatos.
pub struct PumpControl;

const STATES: &[&str] = &["idle", "running"];
const TRANSITIONS: &[Transition] = &[Transition::new("start", States::One("idle"), Some("running")),
                                     Transition::new("start", States::One("cooldown"), None),
                                     Transition::new("stop", States::One("running"), Some("cooldown")),
                                     Transition::new("stop", States::Any, None)];
const TIMERS: &[TimerDef] = &[TimerDef { state: "cooldown",
                                         default: Some(circ_core::TimerDuration::Finite(Duration::from_secs(2))),
                                         event: TimerEventDef::Goto("idle") }];

impl Automaton for PumpControl {
    fn states() -> &'static [&'static str] {
        STATES
    }

    fn transitions() -> &'static [Transition] {
        TRANSITIONS
    }

    fn timers() -> &'static [TimerDef] {
        TIMERS
    }

    fn calc_output(&self, state: &str, _sdata: &circ_core::EventData) -> Option<Value> {
        Some(Value::Bool(state == "running"))
    }
}

/// Registra el circuito de la planta en `circuit`. El umbral queda expuesto
/// para los tests.
pub fn build_plant(circuit: &Circuit, threshold: f64) -> Result<(), CircuitError> {
    SeqBlockBuilder::new("level", ValueInput::with_validator(|v| v.is_number())).initdef(0.0)
                                                                               .comment("simulated tank level")
                                                                               .register(circuit)?;

    CombBlockBuilder::new("high", Compare::new(threshold))
        .input("in", "level")
        .on_output(EventSpec::new("pump",
                                  EventType::cond(Some(EventType::name("start")), Some(EventType::name("stop")))))
        .register(circuit)?;

    let pump = Fsm::new(PumpControl)?.on_enter("running", EventSpec::new("starts", "inc"))?;
    SeqBlockBuilder::new("pump", pump).comment("fill pump controller")
                                      .on_output(EventSpec::new("monitor", "put"))
                                      .register(circuit)?;

    SeqBlockBuilder::new("starts", Counter::new()).persistent(Some(Duration::from_secs(24 * 3600)))
                                                  .comment("lifetime pump starts")
                                                  .register(circuit)?;

    SeqBlockBuilder::new("monitor", OutputFunc::new(|value| {
                             log::info!("pump running: {value}");
                             Ok(())
                         })).register(circuit)?;

    // El estado de la bomba se publica en el monitor.
    circuit.require_block("monitor", circ_core::BlockKindTag::Seq);
    Ok(())
}

//! Oscilador de intervalo como FSM con estados temporizados.

use std::time::Duration;

use circ_core::fsm::{Automaton, Fsm, States, TimerDef, TimerEventDef, Transition};
use circ_core::{CircuitError, EventData};
use serde_json::Value;

/// Autómata on/off: cada estado expira hacia el contrario, generando una
/// onda cuadrada. `start`/`stop` fuerzan el estado desde fuera.
///
/// `restartable` decide qué ocurre con un `start` recibido ya en `on`:
/// `true` reinicia el timer del estado, `false` lo deja correr.
pub struct TickTock {
    pub restartable: bool,
}

const STATES: &[&str] = &["off", "on"];
const TRANSITIONS: &[Transition] = &[Transition::new("start", States::Any, Some("on")),
                                     Transition::new("stop", States::Any, Some("off"))];
const TIMERS: &[TimerDef] = &[TimerDef { state: "on",
                                         default: None,
                                         event: TimerEventDef::Goto("off") },
                              TimerDef { state: "off",
                                         default: None,
                                         event: TimerEventDef::Goto("on") }];

impl Automaton for TickTock {
    fn states() -> &'static [&'static str] {
        STATES
    }

    fn transitions() -> &'static [Transition] {
        TRANSITIONS
    }

    fn timers() -> &'static [TimerDef] {
        TIMERS
    }

    fn cond(&mut self, event: &str, state: &str, _data: &EventData) -> bool {
        // Un start en 'on' sólo se acepta si la instancia es reiniciable.
        !(event == "start" && state == "on" && !self.restartable)
    }

    fn calc_output(&self, state: &str, _sdata: &EventData) -> Option<Value> {
        Some(Value::Bool(state == "on"))
    }
}

/// FSM lista para registrar: duraciones de `on` y `off` por instancia.
pub fn interval_timer(restartable: bool, on: Duration, off: Duration) -> Result<Fsm<TickTock>, CircuitError> {
    Fsm::new(TickTock { restartable })?.duration("on", on)?
                                       .duration("off", off)
}

//! Motor de máquinas de estados finitos sobre bloques secuenciales.
//!
//! Una FSM se define con tres piezas declarativas por tipo (trait
//! `Automaton`):
//! - `states()`: conjunto ordenado; el primero es el estado inicial por
//!   defecto. Los estados temporizados se incorporan implícitamente.
//! - `transitions()`: reglas `(evento, estados, siguiente)`. `states` puede
//!   ser un estado, una lista o el comodín `Any` (menor precedencia).
//!   `next = None` declara el evento explícitamente no aceptado.
//! - `timers()`: `estado temporizado → (duración por defecto, evento)`. La
//!   duración puede ser finita, `Infinite` (nunca dispara) o quedar sin
//!   especificar (obligatoria por instancia).
//!
//! El cuadro se compila y valida en la construcción: una entrada duplicada
//! para el mismo `(evento, estado)` es un error (determinismo).
//!
//! Hooks por instancia: `cond` (rechazo de eventos), `enter`/`exit` por
//! estado, `calc_output` (por defecto, el nombre del estado) y los canales
//! salientes `on_enter_*`, `on_exit_*` y `on_notrans` configurables con
//! `EventSpec`.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::block::ctx::BlockCtx;
use crate::block::seq::SeqLogic;
use crate::errors::CircuitError;
use crate::event::{EventData, EventSpec, EventType};

/// Duración de un estado temporizado.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerDuration {
    Finite(Duration),
    /// El timer nunca dispara (INF_TIME).
    Infinite,
}

/// Evento emitido al vencer el timer de un estado.
#[derive(Debug, Clone, Copy)]
pub enum TimerEventDef {
    Name(&'static str),
    Goto(&'static str),
}

/// Declaración de un estado temporizado.
#[derive(Debug, Clone, Copy)]
pub struct TimerDef {
    pub state: &'static str,
    /// `None` = la duración debe suministrarse por instancia o por evento.
    pub default: Option<TimerDuration>,
    pub event: TimerEventDef,
}

/// Estados a los que aplica una regla de transición.
#[derive(Debug, Clone, Copy)]
pub enum States {
    Any,
    One(&'static str),
    Many(&'static [&'static str]),
}

/// Regla del cuadro de transiciones.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub event: &'static str,
    pub states: States,
    pub next: Option<&'static str>,
}

impl Transition {
    pub const fn new(event: &'static str, states: States, next: Option<&'static str>) -> Self {
        Self { event, states, next }
    }
}

/// Metadatos declarativos + hooks de una FSM concreta.
#[allow(unused_variables)]
pub trait Automaton: Send + 'static {
    fn states() -> &'static [&'static str]
        where Self: Sized;

    fn transitions() -> &'static [Transition]
        where Self: Sized;

    fn timers() -> &'static [TimerDef]
        where Self: Sized
    {
        &[]
    }

    /// Condición por evento; un retorno falso rechaza el evento (el emisor
    /// recibe `false`). El payload y el estado actual llegan como argumentos
    /// explícitos.
    fn cond(&mut self, event: &str, state: &str, data: &EventData) -> bool {
        true
    }

    /// Acción de entrada al estado. Puede encadenar una transición con
    /// `fsm.goto(..)` (una sola vez por entrada).
    fn enter(&mut self, state: &str, fsm: &mut FsmCtx<'_>) -> Result<(), CircuitError> {
        Ok(())
    }

    /// Acción de salida del estado.
    fn exit(&mut self, state: &str, fsm: &mut FsmCtx<'_>) -> Result<(), CircuitError> {
        Ok(())
    }

    /// Salida del bloque; `None` usa el nombre del estado.
    fn calc_output(&self, state: &str, sdata: &EventData) -> Option<Value> {
        None
    }
}

/// Contexto entregado a los hooks `enter`/`exit`.
pub struct FsmCtx<'a> {
    /// Payload del evento en curso.
    pub data: &'a EventData,
    /// Campos persistentes extra de la instancia.
    pub sdata: &'a mut EventData,
    block: &'a mut BlockCtx,
    goto_slot: Option<&'a mut Option<String>>,
}

impl<'a> FsmCtx<'a> {
    /// Nombre del bloque FSM.
    pub fn name(&self) -> &str {
        self.block.name()
    }

    /// Encola un evento saliente dirigido.
    pub fn send(&mut self, dest: impl Into<String>, etype: impl Into<EventType>, data: EventData) {
        self.block.send(dest, etype, data);
    }

    /// Transición encadenada: sólo válida dentro de `enter`, exactamente una
    /// vez por entrada. El estado intermedio no es observable desde fuera.
    pub fn goto(&mut self, state: impl Into<String>) -> Result<(), CircuitError> {
        match self.goto_slot.as_mut() {
            None => Err(CircuitError::block(self.block.name(), "goto() is only allowed inside an enter action")),
            Some(slot) => {
                if slot.is_some() {
                    return Err(CircuitError::block(self.block.name(), "goto() called twice in one enter action"));
                }
                **slot = Some(state.into());
                Ok(())
            }
        }
    }
}

/// Cuadro compilado por evento: entradas específicas + comodín.
struct Row {
    specific: HashMap<usize, Option<usize>>,
    any: Option<Option<usize>>,
}

struct Compiled {
    states: Vec<&'static str>,
    index: HashMap<&'static str, usize>,
    rows: HashMap<&'static str, Row>,
    timers: HashMap<usize, (Option<TimerDuration>, EventType)>,
}

impl Compiled {
    fn index_of(&self, state: &str) -> Option<usize> {
        self.index.get(state).copied()
    }

    /// `Err` = nombre de evento desconocido para esta FSM.
    fn lookup(&self, block: &str, event: &str, state: usize) -> Result<Option<usize>, CircuitError> {
        let row = self.rows.get(event).ok_or_else(|| CircuitError::UnknownEvent { block: block.to_string(),
                                                                                  event: event.to_string() })?;
        match row.specific.get(&state) {
            Some(next) => Ok(*next),
            None => Ok(row.any.flatten()),
        }
    }
}

/// Inserta una entrada específica del cuadro comprobando el determinismo.
fn add_specific(index: &HashMap<&'static str, usize>,
                row: &mut Row,
                event: &str,
                state: &str,
                next: Option<usize>)
                -> Result<(), CircuitError> {
    let idx = *index.get(state)
                    .ok_or_else(|| CircuitError::InvalidState(format!("transition from unknown state '{state}'")))?;
    if row.specific.insert(idx, next).is_some() {
        return Err(CircuitError::InvalidState(format!("non-deterministic table: duplicate rule for event '{event}' \
                                                       in state '{state}'")));
    }
    Ok(())
}

fn compile<A: Automaton>() -> Result<Compiled, CircuitError> {
    let mut states: Vec<&'static str> = Vec::new();
    let mut index: HashMap<&'static str, usize> = HashMap::new();
    for s in A::states() {
        if index.insert(*s, states.len()).is_some() {
            return Err(CircuitError::InvalidState(format!("duplicate state '{s}'")));
        }
        states.push(*s);
    }
    // Estados temporizados implícitos.
    for t in A::timers() {
        if !index.contains_key(t.state) {
            index.insert(t.state, states.len());
            states.push(t.state);
        }
    }
    if states.is_empty() {
        return Err(CircuitError::InvalidState("automaton declares no states".into()));
    }

    let mut rows: HashMap<&'static str, Row> = HashMap::new();
    for t in A::transitions() {
        let next = match t.next {
            None => None,
            Some(n) => Some(*index.get(n)
                                  .ok_or_else(|| CircuitError::InvalidState(format!("transition to unknown state '{n}'")))?),
        };
        let row = rows.entry(t.event).or_insert_with(|| Row { specific: HashMap::new(),
                                                              any: None });
        match t.states {
            States::One(s) => add_specific(&index, row, t.event, s, next)?,
            States::Many(ss) => {
                for s in ss {
                    add_specific(&index, row, t.event, s, next)?;
                }
            }
            States::Any => {
                if row.any.is_some() {
                    return Err(CircuitError::InvalidState(format!("non-deterministic table: duplicate wildcard rule \
                                                                   for event '{}'",
                                                                  t.event)));
                }
                row.any = Some(next);
            }
        }
    }

    let mut timers = HashMap::new();
    for t in A::timers() {
        let idx = index[t.state];
        let event = match t.event {
            TimerEventDef::Name(n) => EventType::Name(n.to_string()),
            TimerEventDef::Goto(s) => {
                if !index.contains_key(s) {
                    return Err(CircuitError::InvalidState(format!("timer of '{}' jumps to unknown state '{s}'", t.state)));
                }
                EventType::Goto(s.to_string())
            }
        };
        if timers.insert(idx, (t.default, event)).is_some() {
            return Err(CircuitError::InvalidState(format!("duplicate timer for state '{}'", t.state)));
        }
    }

    Ok(Compiled { states, index, rows, timers })
}

/// Instancia de FSM lista para registrarse como bloque secuencial.
pub struct Fsm<A: Automaton> {
    auto: A,
    compiled: Compiled,
    state: Option<usize>,
    sdata: EventData,
    durations: HashMap<usize, TimerDuration>,
    on_enter: HashMap<usize, Vec<EventSpec>>,
    on_exit: HashMap<usize, Vec<EventSpec>>,
    on_notrans: Vec<EventSpec>,
}

impl<A: Automaton> Fsm<A> {
    /// Compila y valida los metadatos del autómata.
    pub fn new(auto: A) -> Result<Self, CircuitError> {
        Ok(Self { auto,
                  compiled: compile::<A>()?,
                  state: None,
                  sdata: EventData::new(),
                  durations: HashMap::new(),
                  on_enter: HashMap::new(),
                  on_exit: HashMap::new(),
                  on_notrans: Vec::new() })
    }

    fn state_index(&self, state: &str) -> Result<usize, CircuitError> {
        self.compiled
            .index_of(state)
            .ok_or_else(|| CircuitError::InvalidState(format!("unknown state '{state}'")))
    }

    /// Sobrescribe la duración del timer de un estado para esta instancia.
    pub fn duration(mut self, state: &str, d: Duration) -> Result<Self, CircuitError> {
        let idx = self.state_index(state)?;
        self.durations.insert(idx, TimerDuration::Finite(d));
        Ok(self)
    }

    /// Desactiva el timer de un estado para esta instancia.
    pub fn infinite_duration(mut self, state: &str) -> Result<Self, CircuitError> {
        let idx = self.state_index(state)?;
        self.durations.insert(idx, TimerDuration::Infinite);
        Ok(self)
    }

    /// Evento saliente al entrar en `state` (suprimido en estados
    /// intermedios encadenados y al restaurar desde persistencia).
    pub fn on_enter(mut self, state: &str, spec: EventSpec) -> Result<Self, CircuitError> {
        let idx = self.state_index(state)?;
        self.on_enter.entry(idx).or_default().push(spec);
        Ok(self)
    }

    /// Evento saliente al salir de `state`.
    pub fn on_exit(mut self, state: &str, spec: EventSpec) -> Result<Self, CircuitError> {
        let idx = self.state_index(state)?;
        self.on_exit.entry(idx).or_default().push(spec);
        Ok(self)
    }

    /// Evento saliente cuando un evento no produce transición.
    pub fn on_notrans(mut self, spec: EventSpec) -> Self {
        self.on_notrans.push(spec);
        self
    }

    /// Campo persistente extra inicial.
    pub fn sdata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sdata.insert(key.into(), value.into());
        self
    }

    pub fn state_name(&self) -> Option<&'static str> {
        self.state.map(|i| self.compiled.states[i])
    }

    fn output_value(&self, idx: usize) -> Value {
        self.auto
            .calc_output(self.compiled.states[idx], &self.sdata)
            .unwrap_or_else(|| Value::String(self.compiled.states[idx].to_string()))
    }

    fn sdata_value(&self) -> Value {
        Value::Object(self.sdata
                          .iter()
                          .map(|(k, v)| (k.clone(), v.clone()))
                          .collect())
    }

    /// Payload estándar de los canales salientes de la FSM.
    fn channel_data(&self, ctx: &BlockCtx, trigger: &str, state: usize, event: &str) -> EventData {
        let mut data = EventData::new();
        data.insert("source".to_string(), Value::String(ctx.name().to_string()));
        data.insert("trigger".to_string(), Value::String(trigger.to_string()));
        data.insert("state".to_string(), Value::String(self.compiled.states[state].to_string()));
        data.insert("event".to_string(), Value::String(event.to_string()));
        data.insert("sdata".to_string(), self.sdata_value());
        data
    }

    fn fire_notrans(&self, event: &str, state: usize, ctx: &mut BlockCtx) {
        for spec in &self.on_notrans {
            let data = self.channel_data(ctx, "notrans", state, event);
            ctx.fire_spec(spec.clone(), data);
        }
    }

    fn call_enter(&mut self,
                  idx: usize,
                  data: &EventData,
                  ctx: &mut BlockCtx,
                  goto_req: &mut Option<String>)
                  -> Result<(), CircuitError> {
        let state = self.compiled.states[idx];
        let mut fsm = FsmCtx { data,
                               sdata: &mut self.sdata,
                               block: ctx,
                               goto_slot: Some(goto_req) };
        self.auto.enter(state, &mut fsm)
    }

    fn call_exit(&mut self, idx: usize, data: &EventData, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        let state = self.compiled.states[idx];
        let mut fsm = FsmCtx { data,
                               sdata: &mut self.sdata,
                               block: ctx,
                               goto_slot: None };
        self.auto.exit(state, &mut fsm)
    }

    /// Núcleo de la transición: exit, cambio de estado, enter (con posible
    /// encadenamiento), timer, salida y canales. `event_label` se usa en los
    /// payloads de los canales salientes.
    fn run_transition(&mut self,
                      event_label: &str,
                      target: usize,
                      data: &EventData,
                      ctx: &mut BlockCtx)
                      -> Result<(), CircuitError> {
        let mut next = target;
        let mut first_hop = true;
        loop {
            if let Some(cur) = self.state {
                self.call_exit(cur, data, ctx)?;
                // Invalida el timer pendiente del estado que se abandona.
                ctx.cancel_timers();
                if first_hop {
                    let specs = self.on_exit.get(&cur).cloned().unwrap_or_default();
                    for spec in specs {
                        let d = self.channel_data(ctx, "exit", cur, event_label);
                        ctx.fire_spec(spec, d);
                    }
                }
            }
            self.state = Some(next);

            let mut goto_req: Option<String> = None;
            self.call_enter(next, data, ctx, &mut goto_req)?;
            match goto_req {
                Some(chained) => {
                    // Estado intermedio: sus efectos observables se suprimen
                    // y la salida final muestra una única transición.
                    next = self.state_index(&chained)
                               .map_err(|_| CircuitError::block(ctx.name(), format!("goto to unknown state '{chained}'")))?;
                    first_hop = false;
                }
                None => break,
            }
        }

        let final_idx = next;
        self.schedule_state_timer(final_idx, data, ctx)?;
        ctx.set_output(self.output_value(final_idx));
        let specs = self.on_enter.get(&final_idx).cloned().unwrap_or_default();
        for spec in specs {
            let d = self.channel_data(ctx, "enter", final_idx, event_label);
            ctx.fire_spec(spec, d);
        }
        Ok(())
    }

    /// Programa el evento temporizado del estado recién entrado.
    /// Precedencia de duración: `data["duration"]` > instancia > tipo.
    fn schedule_state_timer(&self, idx: usize, data: &EventData, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        let Some((default, event)) = self.compiled.timers.get(&idx) else {
            return Ok(());
        };
        let override_d = data.get("duration")
                             .and_then(|v| v.as_f64())
                             .map(|secs| TimerDuration::Finite(Duration::from_secs_f64(secs)));
        let duration = override_d.or_else(|| self.durations.get(&idx).copied())
                                 .or(*default);
        let state = self.compiled.states[idx];
        let Some(duration) = duration else {
            return Err(CircuitError::block(ctx.name(), format!("timed state '{state}' has no duration configured")));
        };

        let mut tdata = EventData::new();
        tdata.insert("source".to_string(), Value::String(ctx.name().to_string()));
        tdata.insert("trigger".to_string(), Value::String("timer".to_string()));
        tdata.insert("state".to_string(), Value::String(state.to_string()));
        match duration {
            TimerDuration::Infinite => {}
            TimerDuration::Finite(d) if d.is_zero() => {
                // Duración cero: el evento temporizado se despacha de
                // inmediato, tras reinsertar el bloque.
                let dest = ctx.name().to_string();
                ctx.send(dest, event.clone(), tdata);
            }
            TimerDuration::Finite(d) => ctx.schedule_timer(event.clone(), tdata, d),
        }
        Ok(())
    }

    fn enter_resumed(&mut self, idx: usize, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        self.state = Some(idx);
        // Reanudación de un estado ya entrado: sin hooks ni canales; el
        // timer (si lo hay) arranca de nuevo con su duración configurada.
        self.schedule_state_timer(idx, &EventData::new(), ctx)?;
        ctx.set_output(self.output_value(idx));
        Ok(())
    }
}

impl<A: Automaton> SeqLogic for Fsm<A> {
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        match etype {
            EventType::Goto(target) => {
                // Salto directo: sin cuadro y sin condición.
                let idx = self.state_index(target)
                              .map_err(|_| CircuitError::block(ctx.name(), format!("goto to unknown state '{target}'")))?;
                self.run_transition(&format!("goto:{target}"), idx, data, ctx)?;
                Ok(Value::Bool(true))
            }
            EventType::Name(event) => {
                if self.state.is_none() {
                    // Un evento puede llegar durante el arranque antes de la
                    // fase de init de este bloque: entrar primero al estado
                    // inicial y procesar el evento desde ahí.
                    self.run_transition("init", 0, &EventData::new(), ctx)?;
                }
                let cur = match self.state {
                    Some(c) => c,
                    None => return Err(CircuitError::block(ctx.name(), "state machine failed to initialize")),
                };
                match self.compiled.lookup(ctx.name(), event, cur)? {
                    None => {
                        self.fire_notrans(event, cur, ctx);
                        Ok(Value::Bool(false))
                    }
                    Some(next) => {
                        if !self.auto.cond(event, self.compiled.states[cur], data) {
                            self.fire_notrans(event, cur, ctx);
                            return Ok(Value::Bool(false));
                        }
                        self.run_transition(event, next, data, ctx)?;
                        Ok(Value::Bool(true))
                    }
                }
            }
            EventType::Cond { .. } => {
                // El despachador resuelve `Cond` antes de llegar aquí.
                Err(CircuitError::Internal("unresolved conditional event reached an FSM handler".into()))
            }
        }
    }

    fn init_regular(&mut self, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        // Entrada al estado inicial: sin exit ni condición.
        self.run_transition("init", 0, &EventData::new(), ctx)
    }

    fn init_from_value(&mut self, value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        let state = value.as_str()
                         .ok_or_else(|| CircuitError::block(ctx.name(), "initial value must be a state name"))?;
        let idx = self.state_index(state)
                      .map_err(|_| CircuitError::block(ctx.name(), format!("unknown initial state '{state}'")))?;
        self.run_transition("init", idx, &EventData::new(), ctx)
    }

    fn save_state(&self) -> Option<Value> {
        let state = self.state_name()?;
        Some(serde_json::json!({ "state": state, "sdata": self.sdata_value() }))
    }

    fn restore_state(&mut self, state: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        let name = state.get("state")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| CircuitError::block(ctx.name(), "malformed persisted state"))?;
        let idx = self.state_index(name)
                      .map_err(|_| CircuitError::block(ctx.name(), format!("persisted state '{name}' no longer exists")))?;
        if let Some(Value::Object(map)) = state.get("sdata") {
            self.sdata = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
        self.enter_resumed(idx, ctx)
    }

    fn configured_events(&self) -> Vec<EventSpec> {
        self.on_enter
            .values()
            .chain(self.on_exit.values())
            .flatten()
            .chain(self.on_notrans.iter())
            .cloned()
            .collect()
    }
}

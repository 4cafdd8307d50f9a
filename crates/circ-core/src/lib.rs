//! circ-core: simulador de circuitos digitales dirigido por eventos, con
//! retardo de propagación cero.
//!
//! Propósito:
//! - El usuario ensambla un circuito de bloques interconectados
//!   (combinacionales y secuenciales) y ejecuta una única simulación de
//!   larga vida.
//! - El motor propaga cambios de valor hasta que el circuito se asienta,
//!   despacha eventos tipados entre bloques con estado, gestiona estados
//!   temporizados, integra tareas de I/O cooperativas y conserva estado
//!   seleccionado entre reinicios.
//!
//! Componentes principales:
//! - `circuit`: registro de bloques, resolución de nombres, inversores
//!   implícitos, finalización y singleton de proceso.
//! - `block`: modelo de bloques, builders y macros.
//! - `event`: eventos tipados, payloads y pipeline de filtros.
//! - `fsm`: máquinas de estados con cuadro determinista y estados
//!   temporizados.
//! - `init`: secuenciador de arranque/apagado en cuatro fases.
//! - `runtime`: supervisor de tareas, canal de control, rueda de tiempo y
//!   trampa de SIGTERM.
//! - `persist`: contrato del almacén de estado persistente (+ backend en
//!   memoria).
//!
//! Re-exports: se exponen los símbolos clave para usarlos desde binarios y
//! tests sin rutas largas.

pub mod block;
pub mod circuit;
pub mod constants;
pub mod debug;
pub mod errors;
pub mod event;
pub mod fsm;
pub mod init;
pub mod persist;
pub mod runtime;

// Re-exports públicos principales
pub use block::{konst, BlockCtx, BlockKindTag, CombBlockBuilder, CombLogic, FuncLogic, InputValues, Producer,
                SeqBlockBuilder, SeqLogic};
pub use circuit::{get_circuit, reset_circuit, Circuit};
pub use errors::CircuitError;
pub use event::{is_truthy, EventData, EventFilter, EventSpec, EventType, FilterResult};
pub use fsm::{Automaton, Fsm, FsmCtx, States, TimerDef, TimerDuration, TimerEventDef, Transition};
pub use persist::{InMemoryStateStore, StateStore, StoredState};
pub use runtime::{run, shield, supporting, ControlHandle, ExternalEvent, Simulation, SupportingTask};

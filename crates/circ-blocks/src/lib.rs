//! circ-blocks: librería de bloques concretos sobre el núcleo neutral.
//!
//! Este crate provee:
//! - puertas lógicas combinacionales (`gates`) construidas con la macro
//!   `comb_logic!` del core;
//! - bloques secuenciales de uso general: contador persistente, entrada de
//!   valores validada y adaptadores de salida (síncrono y asíncrono con
//!   guard time);
//! - un oscilador de intervalo reiniciable como FSM (`timer`);
//! - filtros de payload listos para usar (`filters`): detección de flancos y
//!   remodelado de claves.
//!
//! El core sólo conoce los traits `CombLogic`/`SeqLogic`; aquí viven las
//! semánticas concretas que los demos y tests conectan entre sí.

pub mod counter;
pub mod filters;
pub mod gates;
pub mod input;
pub mod output;
pub mod timer;

pub use counter::Counter;
pub use filters::{edge_detect, fall, put_key, rise, select_keys};
pub use gates::{And, Compare, Not, Or, Xor};
pub use input::ValueInput;
pub use output::{AsyncOutput, OutputDriver, OutputFunc};
pub use timer::{interval_timer, TickTock};

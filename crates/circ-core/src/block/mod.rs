//! Modelo de bloques: unidad abstracta del circuito.
//!
//! Variantes (mutuamente excluyentes):
//! - combinacional (`CombLogic`): salida pura de sus entradas, sin estado;
//! - secuencial (`SeqLogic`): estado interno + handler de eventos tipados,
//!   con capacidades opcionales (persistencia, init/stop asíncrono, tarea
//!   principal) sondeadas por el supervisor.
//!
//! `Const` no es un bloque registrado: es un pseudo-productor utilizable en
//! cualquier slot de entrada.

pub mod builder;
pub mod comb;
pub mod control;
pub mod core;
pub mod ctx;
pub mod invert;
pub mod macros;
pub mod seq;

pub use self::builder::{CombBlockBuilder, SeqBlockBuilder};
pub use self::comb::{CombLogic, FuncLogic, InputSlot, InputValues, SlotValues};
pub use self::core::BlockCore;
pub use self::ctx::BlockCtx;
pub(crate) use self::ctx::Effect;
pub use self::seq::{InitFuture, PersistConf, SeqLogic, StopFuture, TaskFuture};

use serde_json::Value;

/// Referencia a un productor de valores: un bloque por nombre (resuelta en
/// la finalización, admite referencias adelantadas y el atajo `_not_X`) o
/// una constante.
#[derive(Debug, Clone, PartialEq)]
pub enum Producer {
    Name(String),
    Const(Value),
}

impl From<&str> for Producer {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Producer {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Constructor corto de productores constantes.
pub fn konst(v: impl Into<Value>) -> Producer {
    Producer::Const(v.into())
}

/// Clase de bloque requerida por `resolve_name` (validación de tipo en la
/// finalización).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKindTag {
    Any,
    Comb,
    Seq,
}

impl std::fmt::Display for BlockKindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "block"),
            Self::Comb => write!(f, "combinational block"),
            Self::Seq => write!(f, "sequential block"),
        }
    }
}

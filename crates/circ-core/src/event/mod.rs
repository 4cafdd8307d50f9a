//! Eventos tipados y especificaciones de eventos salientes.
//!
//! Rol en el circuito:
//! - Un `EventType` identifica el tipo del mensaje entregado a un bloque
//!   secuencial: por nombre, condicional (`Cond`) o salto directo de estado
//!   (`Goto`, sólo FSM).
//! - `EventData` es el payload: un mapa ordenado clave → valor JSON. El motor
//!   inyecta claves reservadas (`source`, `trigger`, `previous`, `value`,
//!   `state`, `event`, `sdata`, `orig_source`, `repeat`).
//! - `EventSpec` describe un evento saliente configurado en un bloque
//!   (canales `on_output`, `on_enter_*`, etc.): destino, tipo, pipeline de
//!   filtros y repetición opcional.

pub mod spec;
pub mod types;

pub use spec::{EventFilter, EventSpec, FilterResult, RepeatConf};
pub use types::{is_truthy, is_valid_key, EventType};

/// Payload de un evento: mapa ordenado de claves identificador a valores.
pub type EventData = indexmap::IndexMap<String, serde_json::Value>;

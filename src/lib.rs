//! circuitflow: aplicación demo sobre el motor `circ-core`.
//!
//! Este crate raíz actúa como capa de aplicación:
//! - `config`: configuración desde entorno/.env.
//! - `demo`: cableado del circuito de ejemplo (planta de bombeo).
//!
//! El motor y los bloques viven en los crates del workspace (`circ-core`,
//! `circ-blocks`, `circ-persistence`).

pub mod config;
pub mod demo;

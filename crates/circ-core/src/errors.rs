//! Errores semánticos del motor.
//!
//! Taxonomía:
//! - `UnknownEvent` es el único error de handler no fatal: se devuelve al
//!   emisor del evento y la simulación continúa.
//! - `Cancelled` señala terminación estructurada; no es un error salvo que
//!   provenga de una tarea de servicio.
//! - El resto aborta la simulación: el primer error capturado gana y se
//!   re-lanza desde `run`/`shutdown`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CircuitError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("block '{0}' is not registered")]
    NotFound(String),
    #[error("block '{name}' is not of the required kind ({expected})")]
    TypeMismatch { name: String, expected: String },
    #[error("block '{block}' has no handler for event '{event}'")]
    UnknownEvent { block: String, event: String },
    #[error("recursive event delivery to block '{block}' (event '{event}')")]
    RecursiveEvent { block: String, event: String },
    #[error("propagation did not settle: block '{block}' re-evaluated more than {limit} times")]
    Instability { block: String, limit: u32 },
    #[error("block '{0}' finished initialization with undefined output")]
    InitializationFailed(String),
    #[error("simulation cancelled: {0}")]
    Cancelled(String),
    #[error("block '{block}': {message}")]
    Block { block: String, message: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl CircuitError {
    /// Error de handler/bloque con el nombre del bloque ya contextualizado.
    pub fn block(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Block { block: name.into(),
                      message: message.to_string() }
    }

    /// `true` para los errores que no deben abortar la simulación.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UnknownEvent { .. })
    }

    /// `true` cuando el error representa cancelación estructurada.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

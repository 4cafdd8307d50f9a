//! Errores de persistencia.
//! Mapea errores de IO y de serialización a variantes semánticas.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed store file: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<PersistenceError> for circ_core::CircuitError {
    fn from(err: PersistenceError) -> Self {
        circ_core::CircuitError::Internal(format!("persistence: {err}"))
    }
}

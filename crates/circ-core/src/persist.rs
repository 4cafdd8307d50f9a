//! Contrato del adaptador de persistencia.
//!
//! El motor guarda por bloque un payload opaco (bytes producidos por
//! `save_state`) bajo la clave = nombre del bloque, junto con el instante de
//! guardado. La caducidad se evalúa al restaurar contra la `expiration`
//! configurada en el bloque; el backend no interpreta los bytes.
//!
//! El almacén lo escribe únicamente el supervisor (checkpoint y stop), nunca
//! de forma concurrente, por lo que la interfaz es síncrona y mínima y los
//! backends (memoria, fichero, base de datos externa) son intercambiables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::warn;

use crate::errors::CircuitError;

/// Registro guardado: payload opaco + instante de guardado.
#[derive(Debug, Clone)]
pub struct StoredState {
    pub payload: Vec<u8>,
    pub saved_at: DateTime<Utc>,
}

/// Almacén clave-valor del estado persistente de bloques.
pub trait StateStore: Send {
    fn get(&self, key: &str) -> Result<Option<StoredState>, CircuitError>;
    fn put(&mut self, key: &str, payload: &[u8]) -> Result<(), CircuitError>;
    fn delete(&mut self, key: &str) -> Result<(), CircuitError>;
}

/// Un registro caduca cuando es más viejo que `expiration`. Si el reloj
/// retrocedió (tiempo transcurrido negativo) el registro se considera
/// vigente y se deja constancia en el log.
pub fn is_expired(record: &StoredState, expiration: Option<std::time::Duration>, key: &str) -> bool {
    let Some(expiration) = expiration else {
        return false;
    };
    let elapsed = Utc::now().signed_duration_since(record.saved_at);
    if elapsed < chrono::Duration::zero() {
        warn!("persistent state '{key}' saved in the future; treating as not expired");
        return false;
    }
    match chrono::Duration::from_std(expiration) {
        Ok(exp) => elapsed > exp,
        Err(_) => false,
    }
}

/// Implementación en memoria del `StateStore`.
///
/// - Volátil: útil para tests y demos.
/// - La variante con respaldo en fichero vive en `circ-persistence`.
#[derive(Default)]
pub struct InMemoryStateStore {
    inner: HashMap<String, StoredState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<StoredState>, CircuitError> {
        Ok(self.inner.get(key).cloned())
    }

    fn put(&mut self, key: &str, payload: &[u8]) -> Result<(), CircuitError> {
        self.inner.insert(key.to_string(),
                          StoredState { payload: payload.to_vec(),
                                        saved_at: Utc::now() });
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), CircuitError> {
        self.inner.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiration_checks() {
        let mut rec = StoredState { payload: b"x".to_vec(),
                                    saved_at: Utc::now() };
        assert!(!is_expired(&rec, None, "k"));
        assert!(!is_expired(&rec, Some(std::time::Duration::from_secs(60)), "k"));

        rec.saved_at = Utc::now() - chrono::Duration::seconds(120);
        assert!(is_expired(&rec, Some(std::time::Duration::from_secs(60)), "k"));

        // Reloj hacia atrás: nunca caducado.
        rec.saved_at = Utc::now() + chrono::Duration::seconds(300);
        assert!(!is_expired(&rec, Some(std::time::Duration::from_secs(60)), "k"));
    }
}

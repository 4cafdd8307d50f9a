//! Almacén de estado con respaldo en un fichero JSON.
//!
//! Paridad con el backend en memoria del core:
//! - el mapa completo se carga al abrir y se reescribe en cada `put`/
//!   `delete` (los payloads de bloque son pequeños);
//! - la reescritura es atómica: fichero temporal junto al definitivo y
//!   rename, para que un corte a mitad de escritura nunca deje un JSON
//!   truncado.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use circ_core::{CircuitError, StateStore, StoredState};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Record {
    payload: Vec<u8>,
    saved_at: DateTime<Utc>,
}

pub struct FileStateStore {
    path: PathBuf,
    records: HashMap<String, Record>,
}

impl FileStateStore {
    /// Abre (o crea) el almacén en `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let records: HashMap<String, Record> = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("state store '{}' opened with {} records", path.display(), records.len());
        Ok(Self { path, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn write_out(&self) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Result<Option<StoredState>, CircuitError> {
        Ok(self.records.get(key).map(|r| StoredState { payload: r.payload.clone(),
                                                       saved_at: r.saved_at }))
    }

    fn put(&mut self, key: &str, payload: &[u8]) -> Result<(), CircuitError> {
        self.records.insert(key.to_string(),
                            Record { payload: payload.to_vec(),
                                     saved_at: Utc::now() });
        self.write_out().map_err(CircuitError::from)
    }

    fn delete(&mut self, key: &str) -> Result<(), CircuitError> {
        if self.records.remove(key).is_some() {
            self.write_out().map_err(CircuitError::from)?;
        }
        Ok(())
    }
}

//! circ-persistence
//!
//! Backend con respaldo en fichero del `StateStore` del core. Objetivo:
//! conservar el estado de los bloques persistentes entre reinicios del
//! proceso sin depender de un servicio externo. Un backend de base de datos
//! real puede implementar el mismo trait sin tocar el core.
//!
//! Módulos:
//! - `file`: almacén JSON con reescritura atómica (fichero temporal +
//!   rename).
//! - `config`: ruta del fichero desde variables de entorno (.env).
//! - `error`: mapeo de errores de IO/serde a variantes semánticas.

pub mod config;
pub mod error;
pub mod file;

pub use config::{state_file_from_env, StoreConfig};
pub use error::PersistenceError;
pub use file::FileStateStore;

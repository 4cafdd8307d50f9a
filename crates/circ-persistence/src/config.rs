//! Carga de configuración del almacén desde variables de entorno.
//! Usa la convención `CIRCUITFLOW_STATE_FILE` y carga `.env` una sola vez.

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let path = env::var("CIRCUITFLOW_STATE_FILE").unwrap_or_else(|_| "circuit-state.json".to_string());
        Self { path: PathBuf::from(path) }
    }
}

/// Ruta del fichero de estado según el entorno (o el default del directorio
/// de trabajo).
pub fn state_file_from_env() -> PathBuf {
    StoreConfig::from_env().path
}

//! Configuración central de la aplicación demo.
//! Carga variables de entorno (.env) y expone una estructura inmutable
//! (`CONFIG`). Las rutas de persistencia y la duración del demo pueden
//! ajustarse sin recompilar.

use std::env;
use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Configuración global de la aplicación.
pub struct AppConfig {
    /// Fichero de estado persistente de los bloques.
    pub state_file: PathBuf,
    /// Duración del demo en segundos (0 = hasta SIGTERM).
    pub demo_seconds: u64,
    /// Periodo del muestreo simulado del nivel.
    pub sample_millis: u64,
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
    let state_file = circ_persistence::state_file_from_env();
    let demo_seconds = env::var("CIRCUITFLOW_DEMO_SECONDS").ok().and_then(|v| v.parse().ok()).unwrap_or(10);
    let sample_millis = env::var("CIRCUITFLOW_SAMPLE_MILLIS").ok().and_then(|v| v.parse().ok()).unwrap_or(250);
    AppConfig { state_file, demo_seconds, sample_millis }
});

//! Constantes del motor de simulación.
//!
//! Este módulo agrupa los valores por defecto que gobiernan el ciclo de vida
//! de los bloques. Los timeouts pueden sobreescribirse por bloque en el
//! builder; estos son los defaults aplicados cuando no se indica nada.

use std::time::Duration;

/// Versión lógica del motor. Se registra en el log al arrancar la simulación
/// para correlacionar trazas con la versión del runtime.
pub const ENGINE_VERSION: &str = "C1.0";

/// Timeout por defecto para la fase de init asíncrono de un bloque.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout por defecto para `stop_async` de un bloque durante el apagado.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefijo reservado para nombres de bloques internos (inversores, `_ctrl`).
pub const INTERNAL_PREFIX: &str = "_";

/// Prefijo del atajo de inversión: `_not_X` referencia un inversor implícito
/// cuya entrada es el bloque `X`.
pub const NOT_PREFIX: &str = "_not_";

/// Prefijo añadido al item `source` de todo evento entrante desde fuera del
/// circuito.
pub const EXTERNAL_SOURCE_PREFIX: &str = "_ext_";

/// Nombre del bloque de control interno (apagado/aborto desde el circuito).
pub const CTRL_BLOCK: &str = "_ctrl";

//! Especificación de eventos salientes y pipeline de filtros.
//!
//! Contrato del pipeline:
//! - Los filtros se aplican de izquierda a derecha sobre el payload.
//! - `Accept(data)` pasa el payload (posiblemente sustituido) al siguiente
//!   filtro; devolver un mapa cuenta siempre como aceptación.
//! - `Reject` corta el pipeline y cancela la entrega; los filtros restantes
//!   no se ejecutan.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{EventData, EventType};

/// Resultado de un filtro del pipeline.
pub enum FilterResult {
    /// Continuar con este payload (el mismo mutado o uno nuevo).
    Accept(EventData),
    /// Cancelar la entrega del evento.
    Reject,
}

/// Filtro puro sobre el payload. Compartible entre specs.
pub type EventFilter = Arc<dyn Fn(EventData) -> FilterResult + Send + Sync>;

/// Configuración de repetición de un evento saliente.
#[derive(Debug, Clone, Copy)]
pub struct RepeatConf {
    /// Intervalo entre re-entregas.
    pub interval: Duration,
    /// Tope de re-entregas; `None` repite sin límite.
    pub count: Option<u32>,
}

// Identidad de spec para el contador de generaciones de repetición.
static NEXT_SPEC_ID: AtomicU64 = AtomicU64::new(1);

/// Evento saliente configurado en un bloque.
///
/// El lado emisor es fijo (bloque + tipo); el payload varía en cada envío.
/// La entrega inyecta las claves del motor antes de correr los filtros.
#[derive(Clone)]
pub struct EventSpec {
    pub(crate) dest: String,
    pub(crate) etype: EventType,
    pub(crate) filters: Vec<EventFilter>,
    pub(crate) repeat: Option<RepeatConf>,
    pub(crate) id: u64,
}

impl EventSpec {
    pub fn new(dest: impl Into<String>, etype: impl Into<EventType>) -> Self {
        Self { dest: dest.into(),
               etype: etype.into(),
               filters: Vec::new(),
               repeat: None,
               id: NEXT_SPEC_ID.fetch_add(1, Ordering::Relaxed) }
    }

    /// Añade un filtro al final del pipeline.
    pub fn filter(mut self, f: impl Fn(EventData) -> FilterResult + Send + Sync + 'static) -> Self {
        self.filters.push(Arc::new(f));
        self
    }

    /// Re-entrega el evento cada `interval`, como máximo `count` veces.
    /// La clave `repeat` del payload lleva el número de re-entrega (0 en la
    /// entrega original).
    pub fn repeat(mut self, interval: Duration, count: Option<u32>) -> Self {
        self.repeat = Some(RepeatConf { interval, count });
        self
    }

    pub fn dest(&self) -> &str {
        &self.dest
    }

    pub fn etype(&self) -> &EventType {
        &self.etype
    }

    /// Corre el pipeline completo. `None` = entrega cancelada.
    pub(crate) fn apply_filters(&self, mut data: EventData) -> Option<EventData> {
        for f in &self.filters {
            match f(data) {
                FilterResult::Accept(d) => data = d,
                FilterResult::Reject => return None,
            }
        }
        Some(data)
    }
}

impl std::fmt::Debug for EventSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSpec")
         .field("dest", &self.dest)
         .field("etype", &self.etype)
         .field("filters", &self.filters.len())
         .field("repeat", &self.repeat)
         .finish()
    }
}

//! Filtros de payload listos para usar en los pipelines de `EventSpec`.
//!
//! Recordatorio del contrato: devolver `Accept(mapa)` pasa el payload al
//! siguiente filtro; `Reject` corta el pipeline y cancela la entrega.

use circ_core::{is_truthy, EventData, FilterResult};
use serde_json::Value;

/// Detector de flancos sobre los eventos de salida (`previous`/`value`).
///
/// - `rise`: acepta transiciones falso → verdadero.
/// - `fall`: acepta transiciones verdadero → falso.
/// - `u_rise`: qué hacer cuando no hay `previous` (la salida anterior era
///   UNDEF) y el valor es verdadero; `None` sigue a `rise`.
pub fn edge_detect(rise: bool, fall: bool, u_rise: Option<bool>) -> impl Fn(EventData) -> FilterResult {
    move |data: EventData| {
        let value = data.get("value").map(is_truthy).unwrap_or(false);
        let previous = data.get("previous").map(is_truthy);
        let accept = match (previous, value) {
            (None, true) => u_rise.unwrap_or(rise),
            (None, false) => false,
            (Some(false), true) => rise,
            (Some(true), false) => fall,
            // Los eventos on_every_output pueden repetir el mismo valor.
            _ => false,
        };
        if accept {
            FilterResult::Accept(data)
        } else {
            FilterResult::Reject
        }
    }
}

/// Flanco de subida con el tratamiento por defecto de UNDEF.
pub fn rise() -> impl Fn(EventData) -> FilterResult {
    edge_detect(true, false, None)
}

/// Flanco de bajada.
pub fn fall() -> impl Fn(EventData) -> FilterResult {
    edge_detect(false, true, None)
}

/// Conserva únicamente las claves listadas.
pub fn select_keys(keys: &'static [&'static str]) -> impl Fn(EventData) -> FilterResult {
    move |data: EventData| {
        let filtered: EventData = data.into_iter().filter(|(k, _)| keys.contains(&k.as_str())).collect();
        FilterResult::Accept(filtered)
    }
}

/// Añade (o sobrescribe) una clave constante.
pub fn put_key(key: &'static str, value: Value) -> impl Fn(EventData) -> FilterResult {
    move |mut data: EventData| {
        data.insert(key.to_string(), value.clone());
        FilterResult::Accept(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(previous: Option<bool>, value: bool) -> EventData {
        let mut data = EventData::new();
        if let Some(p) = previous {
            data.insert("previous".into(), json!(p));
        }
        data.insert("value".into(), json!(value));
        data
    }

    #[test]
    fn rise_accepts_false_to_true_only() {
        let f = rise();
        assert!(matches!(f(ev(Some(false), true)), FilterResult::Accept(_)));
        assert!(matches!(f(ev(Some(true), true)), FilterResult::Reject));
        assert!(matches!(f(ev(Some(true), false)), FilterResult::Reject));
        // Desde UNDEF: sigue a `rise` por defecto.
        assert!(matches!(f(ev(None, true)), FilterResult::Accept(_)));
        assert!(matches!(f(ev(None, false)), FilterResult::Reject));
    }

    #[test]
    fn undef_rise_can_be_overridden() {
        let f = edge_detect(true, false, Some(false));
        assert!(matches!(f(ev(None, true)), FilterResult::Reject));
        assert!(matches!(f(ev(Some(false), true)), FilterResult::Accept(_)));
    }

    #[test]
    fn select_and_put() {
        let keep = select_keys(&["value"]);
        let out = match keep(ev(Some(true), false)) {
            FilterResult::Accept(d) => d,
            FilterResult::Reject => panic!("select_keys never rejects"),
        };
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("value"));

        let tag = put_key("origin", json!("plant"));
        let out = match tag(EventData::new()) {
            FilterResult::Accept(d) => d,
            FilterResult::Reject => panic!("put_key never rejects"),
        };
        assert_eq!(out.get("origin"), Some(&json!("plant")));
    }
}

//! Tipos de evento y helpers de payload.

use serde_json::Value;

/// Tipo de un evento dirigido a un bloque secuencial.
///
/// El conjunto de variantes especiales es cerrado: `Cond` resuelve a una de
/// sus dos ramas según la veracidad de `data["value"]` y `Goto` salta el
/// cuadro de transiciones de una FSM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// Evento regular identificado por nombre.
    Name(String),
    /// Evento condicional: rama verdadera / rama falsa. Una rama ausente
    /// significa "ningún evento" para ese lado.
    Cond {
        etrue: Option<Box<EventType>>,
        efalse: Option<Box<EventType>>,
    },
    /// Transición incondicional de una FSM al estado indicado.
    Goto(String),
}

impl EventType {
    pub fn name(n: impl Into<String>) -> Self {
        Self::Name(n.into())
    }

    pub fn cond(etrue: Option<EventType>, efalse: Option<EventType>) -> Self {
        Self::Cond { etrue: etrue.map(Box::new),
                     efalse: efalse.map(Box::new) }
    }

    pub fn goto(state: impl Into<String>) -> Self {
        Self::Goto(state.into())
    }

    /// Etiqueta corta para logs y mensajes de error.
    pub fn label(&self) -> String {
        match self {
            Self::Name(n) => n.clone(),
            Self::Cond { .. } => "<cond>".to_string(),
            Self::Goto(s) => format!("goto:{s}"),
        }
    }
}

impl From<&str> for EventType {
    fn from(n: &str) -> Self {
        Self::Name(n.to_string())
    }
}

/// Veracidad de un valor JSON, alineada con la resolución de `Cond`:
/// `null`, `false`, `0`, `""` y los contenedores vacíos son falsos.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Las claves de `EventData` deben ser identificadores válidos.
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_json_conventions() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(1.5)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([0])));
    }

    #[test]
    fn key_validation() {
        assert!(is_valid_key("value"));
        assert!(is_valid_key("_ext_source"));
        assert!(!is_valid_key("1abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a-b"));
    }
}

//! Siembra de flags de depuración desde el entorno, procesada una sola vez
//! al arrancar la simulación.
//!
//! - `CIRCUITFLOW_DEBUG_CIRCUIT`: palabra booleana (`1/0`, `true/false`,
//!   `yes/no`, `on/off`).
//! - `CIRCUITFLOW_DEBUG_BLOCKS`: lista separada por comas de patrones
//!   `[+|-]patrón` con comodines estilo Unix (`*`, `?`); los patrones se
//!   aplican en orden y el último que coincide decide.

use std::env;

use log::warn;

use crate::circuit::CircuitState;

const ENV_CIRCUIT: &str = "CIRCUITFLOW_DEBUG_CIRCUIT";
const ENV_BLOCKS: &str = "CIRCUITFLOW_DEBUG_BLOCKS";

pub(crate) fn apply_debug_env(st: &mut CircuitState) {
    if let Ok(raw) = env::var(ENV_CIRCUIT) {
        match parse_bool(&raw) {
            Some(value) => st.debug = value,
            None => warn!("{ENV_CIRCUIT}: unrecognized boolean keyword '{raw}'"),
        }
    }
    let Ok(raw) = env::var(ENV_BLOCKS) else {
        return;
    };
    let patterns: Vec<(bool, String)> = raw.split(',')
                                           .map(str::trim)
                                           .filter(|p| !p.is_empty())
                                           .map(|p| match p.split_at(1) {
                                               ("-", rest) => (false, rest.to_string()),
                                               ("+", rest) => (true, rest.to_string()),
                                               _ => (true, p.to_string()),
                                           })
                                           .collect();
    for slot in st.blocks.values_mut() {
        let Some(entry) = slot.as_mut() else { continue };
        for (enable, pattern) in &patterns {
            if wildcard_match(pattern, &entry.core.name) {
                entry.core.debug = *enable;
            }
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Comparación con comodines estilo Unix: `*` (cualquier secuencia) y `?`
/// (un carácter). Suficiente para filtrar nombres de bloque; no hace falta
/// una librería de globbing completa.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    fn matches(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => matches(&p[1..], n) || (!n.is_empty() && matches(p, &n[1..])),
            (Some('?'), Some(_)) => matches(&p[1..], &n[1..]),
            (Some(c), Some(d)) if c == d => matches(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    matches(&p, &n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(wildcard_match("pump*", "pump1"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("p?mp", "pump"));
        assert!(!wildcard_match("pump", "pumps"));
        assert!(wildcard_match("*valve*", "main_valve_2"));
        assert!(!wildcard_match("?", ""));
    }

    #[test]
    fn boolean_keywords() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("quizas"), None);
    }
}

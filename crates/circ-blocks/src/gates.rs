//! Puertas lógicas combinacionales.
//!
//! Todas leen el slot de grupo `in` (tupla ordenada de productores) salvo
//! `Not` y `Compare`, que usan un slot único `in`. La veracidad de los
//! valores sigue las convenciones JSON del core (`is_truthy`).

use circ_core::{comb_logic, is_truthy};
use serde_json::Value;

comb_logic!(And, |inputs| {
    Ok(Value::Bool(inputs.group("in")?.iter().all(is_truthy)))
});

comb_logic!(Or, |inputs| {
    Ok(Value::Bool(inputs.group("in")?.iter().any(is_truthy)))
});

comb_logic!(Xor, |inputs| {
    let truthy = inputs.group("in")?.iter().filter(|v| is_truthy(v)).count();
    Ok(Value::Bool(truthy % 2 == 1))
});

comb_logic!(Not, |inputs| {
    Ok(Value::Bool(!is_truthy(inputs.value("in")?)))
});

// Umbral numérico: true cuando el valor del slot `in` alcanza `threshold`.
// Una entrada no numérica produce false.
comb_logic!(Compare { threshold: f64 }, |self_, inputs| {
    let reached = inputs.value("in")?
                        .as_f64()
                        .map(|v| v >= self_.threshold)
                        .unwrap_or(false);
    Ok(Value::Bool(reached))
});

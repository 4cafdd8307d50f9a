//! Inversor interno, insertado por el atajo `_not_X` en la finalización.

use serde_json::Value;

use super::comb::{CombLogic, InputValues};
use crate::errors::CircuitError;
use crate::event::is_truthy;

/// Negación lógica de la entrada única `in`.
pub struct Invert;

impl CombLogic for Invert {
    fn calc_output(&self, inputs: &InputValues) -> Result<Value, CircuitError> {
        Ok(Value::Bool(!is_truthy(inputs.value("in")?)))
    }
}

//! Entrada de valores desde el exterior del circuito.

use std::sync::Arc;

use circ_core::{BlockCtx, CircuitError, EventData, EventType, SeqLogic};
use serde_json::Value;

/// Bloque de entrada: acepta eventos `put` con `data["value"]` y expone el
/// último valor aceptado como salida. Un validador opcional rechaza valores
/// fuera de rango (el emisor recibe `false`).
pub struct ValueInput {
    validator: Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
    last: Option<Value>,
}

impl ValueInput {
    pub fn new() -> Self {
        Self { validator: None, last: None }
    }

    pub fn with_validator(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self { validator: Some(Arc::new(f)),
               last: None }
    }
}

impl Default for ValueInput {
    fn default() -> Self {
        Self::new()
    }
}

impl SeqLogic for ValueInput {
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        match etype {
            EventType::Name(n) if n == "put" => {
                let value = data.get("value")
                                .cloned()
                                .ok_or_else(|| CircuitError::block(ctx.name(), "put without a value item"))?;
                if let Some(validator) = &self.validator {
                    if !validator(&value) {
                        log::debug!("{}: value {value:?} rejected by the validator", ctx.name());
                        return Ok(Value::Bool(false));
                    }
                }
                self.last = Some(value.clone());
                ctx.set_output(value);
                Ok(Value::Bool(true))
            }
            other => Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                                      event: other.label() }),
        }
    }

    fn init_from_value(&mut self, value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        self.last = Some(value.clone());
        ctx.set_output(value);
        Ok(())
    }

    fn save_state(&self) -> Option<Value> {
        self.last.clone()
    }
}

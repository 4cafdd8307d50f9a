//! Contador secuencial con estado persistible.

use circ_core::{BlockCtx, CircuitError, EventData, EventType, SeqLogic};
use serde_json::Value;

/// Contador entero. Eventos: `inc`, `dec` (paso configurable vía
/// `data["amount"]`), `put` (fija `data["value"]`) y `reset`. La salida es
/// el valor del contador.
pub struct Counter {
    count: i64,
    initial: i64,
}

impl Counter {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(initial: i64) -> Self {
        Self { count: initial, initial }
    }

    fn amount(data: &EventData) -> i64 {
        data.get("amount").and_then(|v| v.as_i64()).unwrap_or(1)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl SeqLogic for Counter {
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        let event = match etype {
            EventType::Name(n) => n.as_str(),
            other => {
                return Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                                        event: other.label() })
            }
        };
        match event {
            "inc" => self.count += Self::amount(data),
            "dec" => self.count -= Self::amount(data),
            "put" => {
                let value = data.get("value")
                                .and_then(|v| v.as_i64())
                                .ok_or_else(|| CircuitError::block(ctx.name(), "put requires an integer value"))?;
                self.count = value;
            }
            "reset" => self.count = self.initial,
            other => {
                return Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                                        event: other.to_string() })
            }
        }
        ctx.set_output(Value::from(self.count));
        Ok(Value::from(self.count))
    }

    fn init_regular(&mut self, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(Value::from(self.count));
        Ok(())
    }

    fn init_from_value(&mut self, value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        self.count = value.as_i64()
                          .ok_or_else(|| CircuitError::block(ctx.name(), "initial value must be an integer"))?;
        ctx.set_output(Value::from(self.count));
        Ok(())
    }

    fn save_state(&self) -> Option<Value> {
        Some(Value::from(self.count))
    }
}

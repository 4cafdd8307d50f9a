//! Bloque de control interno `_ctrl`.
//!
//! Permite pedir el apagado o el aborto de la simulación desde dentro del
//! propio circuito (por ejemplo, desde un `on_output`). Se crea
//! automáticamente en la finalización si algún spec lo referencia.

use serde_json::Value;

use super::ctx::BlockCtx;
use super::seq::SeqLogic;
use crate::errors::CircuitError;
use crate::event::{EventData, EventType};

pub struct ControlBlock;

impl SeqLogic for ControlBlock {
    fn handle_event(&mut self,
                    etype: &EventType,
                    data: &mut EventData,
                    ctx: &mut BlockCtx)
                    -> Result<Value, CircuitError> {
        let name = match etype {
            EventType::Name(n) => n.as_str(),
            other => {
                return Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                                        event: other.label() })
            }
        };
        match name {
            "shutdown" => {
                ctx.request_shutdown();
                Ok(Value::Bool(true))
            }
            "abort" => {
                let message = data.get("message")
                                  .or_else(|| data.get("value"))
                                  .and_then(|v| v.as_str())
                                  .unwrap_or("abort requested by circuit")
                                  .to_string();
                ctx.request_abort(message);
                Ok(Value::Bool(true))
            }
            other => Err(CircuitError::UnknownEvent { block: ctx.name().to_string(),
                                                      event: other.to_string() }),
        }
    }

    fn init_regular(&mut self, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        // The control block carries no meaningful output.
        ctx.set_output(Value::Null);
        Ok(())
    }

    fn init_from_value(&mut self, _value: Value, ctx: &mut BlockCtx) -> Result<(), CircuitError> {
        ctx.set_output(Value::Null);
        Ok(())
    }
}

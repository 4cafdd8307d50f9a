//! Bloques combinacionales: salida pura de las entradas.

use indexmap::IndexMap;
use serde_json::Value;

use super::Producer;
use crate::errors::CircuitError;

/// Slot de entrada con nombre: un productor único o una tupla ordenada.
#[derive(Debug, Clone)]
pub enum InputSlot {
    Single(Producer),
    Group(Vec<Producer>),
}

/// Valores ya resueltos de un slot en el momento de la evaluación.
#[derive(Debug, Clone)]
pub enum SlotValues {
    Single(Value),
    Group(Vec<Value>),
}

/// Snapshot consistente de las entradas, entregado a `calc_output`.
///
/// El motor sólo evalúa un bloque cuando todas sus entradas están definidas,
/// por lo que aquí no aparece UNDEF.
#[derive(Debug)]
pub struct InputValues {
    slots: IndexMap<String, SlotValues>,
}

impl InputValues {
    pub(crate) fn new(slots: IndexMap<String, SlotValues>) -> Self {
        Self { slots }
    }

    /// Valor de un slot único.
    pub fn value(&self, name: &str) -> Result<&Value, CircuitError> {
        match self.slots.get(name) {
            Some(SlotValues::Single(v)) => Ok(v),
            Some(SlotValues::Group(_)) => Err(CircuitError::Internal(format!("input '{name}' is a group"))),
            None => Err(CircuitError::Internal(format!("no input named '{name}'"))),
        }
    }

    /// Valores de un slot de grupo, en el orden de conexión.
    pub fn group(&self, name: &str) -> Result<&[Value], CircuitError> {
        match self.slots.get(name) {
            Some(SlotValues::Group(vs)) => Ok(vs),
            Some(SlotValues::Single(_)) => Err(CircuitError::Internal(format!("input '{name}' is not a group"))),
            None => Err(CircuitError::Internal(format!("no input named '{name}'"))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlotValues)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Lógica de un bloque combinacional.
///
/// `calc_output` debe ser pura: sólo depende del snapshot de entradas. Los
/// hooks `start`/`stop` existen para adquirir y liberar recursos externos y
/// por defecto no hacen nada.
#[allow(unused_variables)]
pub trait CombLogic: Send {
    fn calc_output(&self, inputs: &InputValues) -> Result<Value, CircuitError>;

    fn start(&mut self) -> Result<(), CircuitError> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// `CombLogic` a partir de un cierre sobre las entradas. Base de los bloques
/// de función de la librería de bloques.
pub struct FuncLogic<F>(pub F);

impl<F> CombLogic for FuncLogic<F> where F: Fn(&InputValues) -> Result<Value, CircuitError> + Send
{
    fn calc_output(&self, inputs: &InputValues) -> Result<Value, CircuitError> {
        (self.0)(inputs)
    }
}

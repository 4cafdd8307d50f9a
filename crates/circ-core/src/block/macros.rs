//! Macros utilitarias para reducir boilerplate al definir lógicas
//! combinacionales y payloads de evento.
//!
//! Exportadas en la raíz del crate:
//!   use circ_core::{comb_logic, event_data};

/// Declara una lógica combinacional con nombre.
///
/// Formas soportadas:
/// - comb_logic!(Name, |inputs| { ... });                   // struct unitaria
/// - comb_logic!(Name { f1: Ty1, f2: Ty2 }, |self_, inputs| { ... });
#[macro_export]
macro_rules! comb_logic {
    ($name:ident, |$inputs:ident| $body:block) => {
        pub struct $name;
        impl $crate::block::CombLogic for $name {
            fn calc_output(&self, $inputs: &$crate::block::InputValues)
                           -> Result<serde_json::Value, $crate::CircuitError> {
                $body
            }
        }
    };

    ($name:ident { $($fname:ident : $fty:ty),+ $(,)? }, |$self_ident:ident, $inputs:ident| $body:block) => {
        pub struct $name { $(pub $fname: $fty),+ }
        impl $name {
            pub fn new($($fname: $fty),+) -> Self { Self { $($fname),+ } }
        }
        impl $crate::block::CombLogic for $name {
            fn calc_output(&self, $inputs: &$crate::block::InputValues)
                           -> Result<serde_json::Value, $crate::CircuitError> {
                let $self_ident = self;
                $body
            }
        }
    };
}

/// Construye un `EventData` literal:
///   event_data! { "value" => true, "source" => "button" }
#[macro_export]
macro_rules! event_data {
    () => { $crate::event::EventData::new() };
    ($($key:expr => $val:expr),+ $(,)?) => {{
        let mut data = $crate::event::EventData::new();
        $( data.insert($key.to_string(), serde_json::json!($val)); )+
        data
    }};
}

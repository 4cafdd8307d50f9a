//! Rueda de tiempo: agenda de despertares de la simulación.
//!
//! Un min-heap ordenado por `(deadline, seq)` — los empates se resuelven por
//! orden de programación. Las cancelaciones no tocan el heap: cada entrada
//! lleva un sello de generación que se compara con la generación vigente del
//! bloque (o del spec repetido) en el momento del disparo; una entrada con
//! generación vieja simplemente se descarta.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

use crate::event::{EventData, EventSpec, EventType};

/// Validez de una entrada de la rueda en el momento del disparo.
pub(crate) enum TimerGuard {
    /// Timer de estado de una FSM: válido mientras el bloque no haya saltado
    /// de generación (cancelación al salir del estado).
    BlockGen { block: String, gen: u64 },
    /// Re-entrega de un `EventSpec` con repetición configurada.
    Repeat {
        spec: Box<EventSpec>,
        gen: u64,
        /// Número de re-entrega (1-based).
        n: u32,
    },
}

pub(crate) struct TimerEntry {
    pub deadline: Instant,
    pub seq: u64,
    pub dest: String,
    pub etype: EventType,
    pub data: EventData,
    pub guard: TimerGuard,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

pub(crate) struct TimerWheel {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(),
               seq: 0 }
    }

    pub fn schedule(&mut self, after: Duration, dest: String, etype: EventType, data: EventData, guard: TimerGuard) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(TimerEntry { deadline: Instant::now() + after,
                                            seq,
                                            dest,
                                            etype,
                                            data,
                                            guard }));
    }

    /// Deadline más próximo pendiente, si lo hay.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(e)| e.deadline)
    }

    /// Extrae la siguiente entrada vencida a `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEntry> {
        match self.heap.peek() {
            Some(Reverse(e)) if e.deadline <= now => self.heap.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

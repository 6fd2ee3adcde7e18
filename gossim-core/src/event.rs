//! Simulation events.
//!
//! Every element publishes what happens to it (packets generated, sent,
//! received, switched, discarded, in flight, links broken...) to a single
//! fan-in [`EventSink`]. Consumers (a GUI, a trace file, the tests) only
//! read events; they never feed anything back into the engine.

use crate::{
    element::ElementId,
    link::LinkEnd,
    node::PortId,
    pdu::{Address, PduClass, PduId},
    time::TimeInstant,
};
use parking_lot::Mutex;
use std::fmt;

/// Identifier of a [`SimulationEvent`], unique for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u64);

impl EventId {
    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationEvent {
    pub id: EventId,
    pub instant: TimeInstant,
    /// the element the event is about
    pub source: ElementId,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    PacketGenerated {
        pdu: PduId,
        class: PduClass,
        bytes: u32,
    },
    PacketSent {
        pdu: PduId,
        class: PduClass,
        port: PortId,
    },
    PacketReceived {
        pdu: PduId,
        class: PduClass,
        port: Option<PortId>,
    },
    PacketSwitched {
        pdu: PduId,
        class: PduClass,
    },
    PacketDiscarded {
        pdu: PduId,
        class: PduClass,
    },
    PacketOnFly {
        pdu: PduId,
        class: PduClass,
        end: LinkEnd,
        percentage: u8,
    },
    LspEstablished {
        fec: Address,
        label: u32,
    },
    LinkBroken,
    LinkRecovered,
}

/// Fan-in consumer of [`SimulationEvent`]s.
///
/// Called concurrently by every element during a tick.
pub trait EventSink: Send + Sync {
    fn capture(&self, event: SimulationEvent);
}

/// An [`EventSink`] that keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<SimulationEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Take every event captured so far, sorted by instant then id.
    pub fn drain(&self) -> Vec<SimulationEvent> {
        let mut events = std::mem::take(&mut *self.events.lock());
        events.sort_by_key(|event| (event.instant, event.id));
        events
    }

    /// Copy of the events captured so far matching `filter`.
    pub fn filtered<F>(&self, filter: F) -> Vec<SimulationEvent>
    where
        F: Fn(&SimulationEvent) -> bool,
    {
        self.events
            .lock()
            .iter()
            .filter(|event| filter(event))
            .cloned()
            .collect()
    }
}

impl EventSink for EventLog {
    fn capture(&self, event: SimulationEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64, instant: u64) -> SimulationEvent {
        SimulationEvent {
            id: EventId(id),
            instant: TimeInstant::from_nanos(instant),
            source: ElementId::new(1),
            kind: EventKind::LinkBroken,
        }
    }

    #[test]
    fn drain_sorts_and_empties() {
        let log = EventLog::new();
        log.capture(event(3, 200));
        log.capture(event(1, 100));
        log.capture(event(2, 200));

        assert_eq!(log.len(), 3);
        let ids: Vec<_> = log.drain().iter().map(|e| e.id.into_u64()).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert!(log.is_empty());
    }

    #[test]
    fn filtered_copies() {
        let log = EventLog::new();
        log.capture(event(1, 100));
        log.capture(event(2, 300));

        let late = log.filtered(|e| e.instant > TimeInstant::from_nanos(150));
        assert_eq!(late.len(), 1);
        assert_eq!(log.len(), 2);
    }
}

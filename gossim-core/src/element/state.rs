use super::{ElementError, ElementId, ElementKind, TickGeneration, TimerEvent};
use crate::{
    event::{EventId, EventKind, EventSink, SimulationEvent},
    ids::{IdGenerator, IdentifierOverflow},
    time::TimeInstant,
};
use parking_lot::Mutex;
use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use thiserror::Error;

/// An element can only ever publish to one [`EventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Element ({element}) already has an event sink")]
pub struct SubscriptionConflict {
    pub element: ElementId,
}

#[derive(Debug, Clone, Copy, Default)]
struct Timing {
    generation: TickGeneration,
    tick_duration: Duration,
    instant: TimeInstant,
}

/// Lifecycle shared by every node and link of the topology.
///
/// Records the timer events received from the clock, holds the element's
/// single event sink and its well-configured and alive flags.
pub struct ElementState {
    id: ElementId,
    kind: ElementKind,

    well_configured: AtomicBool,
    alive: AtomicBool,

    timing: Mutex<Timing>,

    sink: OnceLock<Arc<dyn EventSink>>,
    event_ids: IdGenerator,
}

impl ElementState {
    pub(crate) fn new(id: ElementId, kind: ElementKind, event_ids: IdGenerator) -> Self {
        Self {
            id,
            kind,
            well_configured: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            timing: Mutex::new(Timing::default()),
            sink: OnceLock::new(),
            event_ids,
        }
    }

    #[inline]
    pub fn id(&self) -> ElementId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Record the tick duration and upper time limit of `timer`.
    ///
    /// The timer must belong to the generation directly following the
    /// last one this element handled; anything else is a straggler and is
    /// rejected.
    pub fn on_timer(&self, timer: &TimerEvent) -> Result<(), ElementError> {
        let mut timing = self.timing.lock();
        let expected = timing.generation.next();
        if timer.generation != expected {
            return Err(ElementError::StaleTick {
                element: self.id,
                expected,
                received: timer.generation,
            });
        }

        timing.generation = timer.generation;
        timing.tick_duration = timer.tick_duration;
        timing.instant = timer.upper_limit;
        Ok(())
    }

    pub fn generation(&self) -> TickGeneration {
        self.timing.lock().generation
    }

    pub fn tick_duration(&self) -> Duration {
        self.timing.lock().tick_duration
    }

    /// The upper time limit of the last tick this element handled.
    pub fn instant(&self) -> TimeInstant {
        self.timing.lock().instant
    }

    /// Bind the event sink of this element.
    ///
    /// # Errors
    ///
    /// [`SubscriptionConflict`] if a sink is already bound: an element
    /// keeps its first sink for its whole lifetime.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> Result<(), SubscriptionConflict> {
        self.sink
            .set(sink)
            .map_err(|_| SubscriptionConflict { element: self.id })
    }

    pub fn has_sink(&self) -> bool {
        self.sink.get().is_some()
    }

    /// Publish an event about this element, if a sink is bound.
    pub fn emit(&self, kind: EventKind) -> Result<(), IdentifierOverflow> {
        self.emit_as(self.id, kind)
    }

    /// Publish an event on behalf of `source` (e.g. a link discarding a
    /// packet addressed to one of its end nodes).
    pub fn emit_as(&self, source: ElementId, kind: EventKind) -> Result<(), IdentifierOverflow> {
        let Some(sink) = self.sink.get() else {
            return Ok(());
        };
        let id = EventId(self.event_ids.generate()?);
        sink.capture(SimulationEvent {
            id,
            instant: self.instant(),
            source,
            kind,
        });
        Ok(())
    }

    pub fn is_well_configured(&self) -> bool {
        self.well_configured.load(Ordering::SeqCst)
    }

    pub(crate) fn set_well_configured(&self, well_configured: bool) {
        self.well_configured.store(well_configured, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Set the alive flag, returning its previous value.
    pub(crate) fn swap_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::SeqCst)
    }

    /// Back to generation zero and time zero. The sink stays bound.
    pub(crate) fn reset(&self) {
        *self.timing.lock() = Timing::default();
        self.swap_alive(true);
    }
}

impl std::fmt::Debug for ElementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementState")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("well_configured", &self.is_well_configured())
            .field("alive", &self.is_alive())
            .field("has_sink", &self.has_sink())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLog;

    fn state() -> ElementState {
        ElementState::new(
            ElementId::new(7),
            ElementKind::Node,
            IdGenerator::new("event"),
        )
    }

    fn timer(generation: TickGeneration, upper: u64) -> TimerEvent {
        TimerEvent {
            generation,
            tick_duration: Duration::from_nanos(100),
            upper_limit: TimeInstant::from_nanos(upper),
        }
    }

    #[test]
    fn records_timer() {
        let state = state();
        let first = TickGeneration::ZERO.next();
        state.on_timer(&timer(first, 100)).unwrap();

        assert_eq!(state.generation(), first);
        assert_eq!(state.tick_duration(), Duration::from_nanos(100));
        assert_eq!(state.instant(), TimeInstant::from_nanos(100));
    }

    #[test]
    fn rejects_stragglers() {
        let state = state();
        let first = TickGeneration::ZERO.next();
        state.on_timer(&timer(first, 100)).unwrap();

        // same generation twice
        let error = state.on_timer(&timer(first, 100)).unwrap_err();
        assert!(matches!(error, ElementError::StaleTick { .. }));

        // skipping a generation
        let error = state.on_timer(&timer(first.next().next(), 300)).unwrap_err();
        assert!(matches!(error, ElementError::StaleTick { .. }));
        assert_eq!(state.generation(), first);
    }

    #[test]
    fn second_sink_is_a_conflict() {
        let state = state();
        state.subscribe(Arc::new(EventLog::new())).unwrap();

        let error = state.subscribe(Arc::new(EventLog::new())).unwrap_err();
        assert_eq!(error.element, ElementId::new(7));
    }

    #[test]
    fn emit_without_sink_is_silent() {
        let state = state();
        state.emit(EventKind::LinkBroken).unwrap();
    }

    #[test]
    fn emit_stamps_instant() {
        let state = state();
        let log = Arc::new(EventLog::new());
        state.subscribe(log.clone()).unwrap();
        state
            .on_timer(&timer(TickGeneration::ZERO.next(), 100))
            .unwrap();
        state.emit(EventKind::LinkRecovered).unwrap();

        let events = log.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].instant, TimeInstant::from_nanos(100));
        assert_eq!(events[0].source, ElementId::new(7));
    }

    #[test]
    fn reset_keeps_sink() {
        let state = state();
        state.subscribe(Arc::new(EventLog::new())).unwrap();
        state
            .on_timer(&timer(TickGeneration::ZERO.next(), 100))
            .unwrap();

        assert!(state.swap_alive(false));
        assert!(!state.is_alive());

        state.reset();
        assert_eq!(state.generation(), TickGeneration::ZERO);
        assert!(state.has_sink());
        assert!(state.is_alive());
    }
}

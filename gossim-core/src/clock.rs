//! The tick barrier.
//!
//! The [`Clock`] owns the simulated time. Every tick it broadcasts a
//! [`TimerEvent`] to every element of the [`Topology`], one job per
//! element on a bounded worker pool, and waits for all of them before
//! consolidating the statistics of the nodes. Ticks never overlap.

use crate::{
    element::{ElementError, ElementId, TickContext, TickGeneration, TimerEvent, Tickable as _},
    routing::RoutingTable,
    time::TimeInstant,
    topology::Topology,
};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder, prelude::*};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("The simulation step cannot be zero")]
    InvalidStep,
    #[error("Failed to build the worker pool")]
    WorkerPool(#[from] ThreadPoolBuildError),
    #[error("Element ({element}) failed during the tick")]
    ElementFailed {
        element: ElementId,
        #[source]
        source: ElementError,
    },
    #[error("The clock was aborted by a previous failure")]
    Aborted,
}

/// What a completed tick covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub generation: TickGeneration,
    pub tick_duration: Duration,
    /// the simulated time at the end of the tick
    pub instant: TimeInstant,
}

pub struct Clock {
    step: Duration,
    limit: TimeInstant,

    now: TimeInstant,
    generation: TickGeneration,
    routes: RoutingTable,

    pool: ThreadPool,
    poisoned: bool,
}

impl Clock {
    /// A clock advancing by `step` until `duration` of simulated time
    /// elapsed, running the element jobs on `workers` threads (`0` lets
    /// the pool pick one thread per core).
    pub fn new(step: Duration, duration: Duration, workers: usize) -> Result<Self, ClockError> {
        if step.is_zero() {
            return Err(ClockError::InvalidStep);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("gossim-worker-{index}"))
            .build()?;

        Ok(Self {
            step,
            limit: TimeInstant::ZERO.saturating_add(duration),
            now: TimeInstant::ZERO,
            generation: TickGeneration::ZERO,
            routes: RoutingTable::default(),
            pool,
            poisoned: false,
        })
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn limit(&self) -> TimeInstant {
        self.limit
    }

    pub fn now(&self) -> TimeInstant {
        self.now
    }

    pub fn generation(&self) -> TickGeneration {
        self.generation
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn is_finished(&self) -> bool {
        self.now >= self.limit
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Run one tick.
    ///
    /// Returns `None` once the simulated duration is reached. After an
    /// element failed, every call returns [`ClockError::Aborted`].
    pub fn tick(&mut self, topology: &Topology) -> Result<Option<TickReport>, ClockError> {
        if self.poisoned {
            return Err(ClockError::Aborted);
        }
        if self.is_finished() {
            return Ok(None);
        }

        let remaining = self.limit.duration_since(self.now);
        let tick_duration = self.step.min(remaining);
        let generation = self.generation.next();
        let instant = self.now.saturating_add(tick_duration);

        if topology.take_routing_dirty() {
            debug!(%generation, "computing the routes");
            self.routes = RoutingTable::compute(topology);
        }

        let ctx = TickContext {
            timer: TimerEvent {
                generation,
                tick_duration,
                upper_limit: instant,
            },
            topology,
            routes: &self.routes,
        };

        let elements = topology.elements();
        let mut failures: Vec<(ElementId, ElementError)> = self.pool.install(|| {
            elements
                .par_iter()
                .filter_map(|element| {
                    element
                        .receive_timer_event(&ctx)
                        .err()
                        .map(|error| (element.id(), error))
                })
                .collect()
        });

        if !failures.is_empty() {
            self.poisoned = true;
            failures.sort_by_key(|(element, _)| *element);
            for (element, error) in failures.iter().skip(1) {
                warn!(%element, %error, %generation, "element failed");
            }
            let (element, source) = failures.swap_remove(0);
            return Err(ClockError::ElementFailed { element, source });
        }

        for node in topology.nodes() {
            node.consolidate_stats(instant);
        }

        self.generation = generation;
        self.now = instant;
        trace!(%generation, %instant, "tick");

        Ok(Some(TickReport {
            generation,
            tick_duration,
            instant,
        }))
    }

    /// Tick until the simulated duration is reached. Returns the number
    /// of ticks executed.
    pub fn run_until_finished(&mut self, topology: &Topology) -> Result<u64, ClockError> {
        let mut ticks = 0;
        while self.tick(topology)?.is_some() {
            ticks += 1;
        }
        debug!(ticks, now = %self.now, "finished");
        Ok(ticks)
    }

    /// Back to time zero, the routes will be computed again.
    pub fn reset(&mut self) {
        self.now = TimeInstant::ZERO;
        self.generation = TickGeneration::ZERO;
        self.routes = RoutingTable::default();
        self.poisoned = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::NodeConfig, pdu::Address};

    fn receiver() -> (Topology, ElementId) {
        let mut topology = Topology::new();
        let id = topology.add_node(NodeConfig::receiver("r", Address::new(10, 0, 0, 1)));
        (topology, id)
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!(matches!(
            Clock::new(Duration::ZERO, Duration::from_micros(1), 1),
            Err(ClockError::InvalidStep)
        ));
    }

    #[test]
    fn last_tick_is_shortened() {
        let (topology, _) = receiver();
        let mut clock = Clock::new(
            Duration::from_nanos(300),
            Duration::from_nanos(1_000),
            1,
        )
        .unwrap();

        let mut durations = Vec::new();
        while let Some(report) = clock.tick(&topology).unwrap() {
            durations.push(report.tick_duration.as_nanos());
        }
        assert_eq!(durations, [300, 300, 300, 100]);
        assert_eq!(clock.now(), TimeInstant::from_nanos(1_000));
        assert_eq!(clock.generation().into_u64(), 4);
        assert!(clock.tick(&topology).unwrap().is_none());
    }

    #[test]
    fn run_until_finished_counts_ticks() {
        let (topology, _) = receiver();
        let mut clock =
            Clock::new(Duration::from_nanos(100), Duration::from_micros(1), 2).unwrap();
        assert_eq!(clock.run_until_finished(&topology).unwrap(), 10);

        clock.reset();
        topology.reset();
        assert_eq!(clock.now(), TimeInstant::ZERO);
        assert_eq!(clock.run_until_finished(&topology).unwrap(), 10);
    }

    #[test]
    fn a_failing_element_aborts_the_clock() {
        let (topology, id) = receiver();
        let mut clock =
            Clock::new(Duration::from_nanos(100), Duration::from_micros(1), 1).unwrap();

        // the node already saw the first tick, the clock's one is stale
        let routes = RoutingTable::default();
        let ctx = TickContext {
            timer: TimerEvent {
                generation: TickGeneration::ZERO.next(),
                tick_duration: Duration::from_nanos(100),
                upper_limit: TimeInstant::from_nanos(100),
            },
            topology: &topology,
            routes: &routes,
        };
        topology
            .node(id)
            .unwrap()
            .receive_timer_event(&ctx)
            .unwrap();

        match clock.tick(&topology) {
            Err(ClockError::ElementFailed {
                element,
                source: ElementError::StaleTick { .. },
            }) => assert_eq!(element, id),
            other => panic!("unexpected {other:?}"),
        }
        assert!(clock.is_poisoned());
        assert!(matches!(clock.tick(&topology), Err(ClockError::Aborted)));
        assert_eq!(clock.now(), TimeInstant::ZERO);
    }
}

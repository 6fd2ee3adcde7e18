//! What every node and link of the topology has in common.
//!
//! An element is driven by the [`Clock`]: once per tick it receives a
//! [`TimerEvent`] inside a [`TickContext`] and does its work for that
//! tick. Nodes additionally accept packets from links ([`PacketSink`])
//! and both nodes and links report a weight to the routing
//! ([`Routable`]).
//!
//! [`Clock`]: crate::clock::Clock

mod generation;
mod id;
mod state;

use crate::{
    ids::IdentifierOverflow, node::PortId, pdu::Pdu, routing::RoutingTable, time::TimeInstant,
    topology::Topology,
};
use std::{fmt, time::Duration};
use thiserror::Error;

pub use self::{
    generation::TickGeneration,
    id::ElementId,
    state::{ElementState, SubscriptionConflict},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Node,
    Link,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Link => f.write_str("link"),
        }
    }
}

/// Broadcast by the clock to every element, once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub generation: TickGeneration,
    /// `min(step, limit - now)`
    pub tick_duration: Duration,
    /// the simulated time at the end of the tick
    pub upper_limit: TimeInstant,
}

/// Everything an element may look at while handling a tick.
///
/// The topology and the routing table are shared read-only between every
/// job of the tick.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub timer: TimerEvent,
    pub topology: &'a Topology,
    pub routes: &'a RoutingTable,
}

impl<'a> TickContext<'a> {
    #[inline]
    pub fn generation(&self) -> TickGeneration {
        self.timer.generation
    }

    #[inline]
    pub fn tick_duration(&self) -> Duration {
        self.timer.tick_duration
    }

    #[inline]
    pub fn instant(&self) -> TimeInstant {
        self.timer.upper_limit
    }
}

#[derive(Debug, Error)]
pub enum ElementError {
    #[error(
        "Element ({element}) received a timer event of generation {received}, expected {expected}"
    )]
    StaleTick {
        element: ElementId,
        expected: TickGeneration,
        received: TickGeneration,
    },
    #[error(transparent)]
    IdentifierOverflow(#[from] IdentifierOverflow),
    #[error("Unknown element ({0})")]
    UnknownElement(ElementId),
}

/// Driven by the clock, once per tick.
pub trait Tickable {
    fn receive_timer_event(&self, ctx: &TickContext<'_>) -> Result<(), ElementError>;
}

/// Accepts packets handed over by a link.
///
/// Safe to call concurrently from several links during the same tick.
pub trait PacketSink {
    fn put_packet(
        &self,
        pdu: Pdu,
        port: PortId,
        generation: TickGeneration,
    ) -> Result<(), ElementError>;
}

pub trait Routable {
    /// Cost of going through this element. `None` when the element
    /// cannot be part of a route (e.g. a broken link).
    fn routing_weight(&self) -> Option<u64>;
}

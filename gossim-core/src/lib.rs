//! Tick-synchronized simulation of a label switching network with
//! Guarantee of Service (GoS) levels and local recovery of lost GoS
//! packets (GPSRP).
//!
//! A [`Topology`] of [`Node`]s joined by [`Link`]s is driven by a
//! [`Clock`]: every tick each element receives the timer event on a
//! bounded worker pool and the clock waits for all of them before
//! moving on. Packets handed over during a tick are only processed
//! during the next one, which makes a run independent of the order the
//! elements are scheduled in.
//!
//! ```
//! use gossim_core::{
//!     Clock, Topology,
//!     link::{LinkConfig, LinkEndpoint, LinkKind},
//!     node::{NodeConfig, PortId, RouterConfig, SenderConfig},
//! };
//! use std::time::Duration;
//!
//! let [s, ler, r]: [gossim_core::Address; 3] =
//!     ["10.0.0.1", "10.0.0.2", "10.0.0.3"].map(|a| a.parse().unwrap());
//! let port = PortId::new;
//!
//! let mut topology = Topology::new();
//! topology.add_node(NodeConfig::sender("sender", s, SenderConfig::new(r)));
//! topology.add_node(NodeConfig::ler("ler", ler, RouterConfig::default()));
//! topology.add_node(NodeConfig::receiver("receiver", r));
//! topology.add_link(LinkConfig::new(
//!     "in",
//!     LinkKind::External,
//!     LinkEndpoint::new(s, port(0)),
//!     LinkEndpoint::new(ler, port(0)),
//! ));
//! topology.add_link(LinkConfig::new(
//!     "out",
//!     LinkKind::External,
//!     LinkEndpoint::new(ler, port(1)),
//!     LinkEndpoint::new(r, port(0)),
//! ));
//! assert!(topology.validate().is_empty());
//!
//! let mut clock = Clock::new(Duration::from_nanos(100), Duration::from_micros(50), 2).unwrap();
//! clock.run_until_finished(&topology).unwrap();
//!
//! let receiver = topology.node_by_address(r).unwrap();
//! assert!(receiver.stats().total_by_direction(gossim_core::stats::Direction::Incoming) > 0);
//! ```

pub mod clock;
pub mod defaults;
pub mod element;
pub mod event;
pub mod ids;
pub mod link;
pub mod measure;
pub mod node;
pub mod pdu;
pub mod routing;
pub mod stats;
pub mod time;
pub mod topology;

pub use self::{
    clock::{Clock, ClockError, TickReport},
    element::{ElementError, ElementId, ElementKind, TickGeneration},
    event::{EventKind, EventLog, EventSink, SimulationEvent},
    link::Link,
    measure::{BitRate, LinkDelay, NsCredit},
    node::Node,
    pdu::{Address, Pdu, PduClass, PduId},
    time::TimeInstant,
    topology::{Element, Topology},
};

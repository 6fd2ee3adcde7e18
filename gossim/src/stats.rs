//! Observability types for [`Simulation`].
//!
//! Obtain a snapshot via [`Simulation::stats`](crate::Simulation::stats).
//!
//! [`Simulation`]: crate::Simulation

use gossim_core::{
    Address, ElementId, Link, Node, TimeInstant,
    link::{LinkKind, TransitView},
    stats::{Direction, RecoveryCounters, Stats},
};

/// Statistics of a single node of a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub id: ElementId,
    pub name: String,
    pub address: Address,
    /// `Sender`, `Receiver`, `LER`, `ActiveLER`, `LSR` or `ActiveLSR`
    pub role: &'static str,
    /// Packets waiting in the ports.
    pub queued: usize,
    /// Bytes waiting in the ports.
    pub queued_bytes: u64,
    /// GoS packets kept for retransmission (active routers only).
    pub dmgp_len: usize,
    /// Counters and consolidated series.
    pub inner: Stats,
}

impl NodeStats {
    pub(crate) fn new(node: &Node) -> Self {
        Self {
            id: node.id(),
            name: node.name().to_owned(),
            address: node.address(),
            role: node.role().name(),
            queued: node.queued(),
            queued_bytes: node.queued_bytes(),
            dmgp_len: node.dmgp_len(),
            inner: node.stats(),
        }
    }

    pub fn incoming(&self) -> u64 {
        self.inner.total_by_direction(Direction::Incoming)
    }

    pub fn outgoing(&self) -> u64 {
        self.inner.total_by_direction(Direction::Outgoing)
    }

    pub fn discarded(&self) -> u64 {
        self.inner.total_by_direction(Direction::Discarded)
    }

    pub fn recovery(&self) -> RecoveryCounters {
        self.inner.recovery()
    }
}

/// Statistics of a single link of a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone)]
pub struct LinkStats {
    pub id: ElementId,
    pub name: String,
    pub kind: LinkKind,
    pub broken: bool,
    /// Packets still counting down the delay of the link.
    pub in_transit: Vec<TransitView>,
}

impl LinkStats {
    pub(crate) fn new(link: &Link) -> Self {
        Self {
            id: link.id(),
            name: link.name().to_owned(),
            kind: link.kind(),
            broken: link.is_broken(),
            in_transit: link.in_transit(),
        }
    }
}

/// Point-in-time snapshot of the entire simulated network.
#[derive(Debug, Clone)]
pub struct SimStats {
    /// the simulated time of the snapshot
    pub instant: TimeInstant,
    pub nodes: Vec<NodeStats>,
    pub links: Vec<LinkStats>,
}

impl SimStats {
    pub fn node(&self, name: &str) -> Option<&NodeStats> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn link(&self, name: &str) -> Option<&LinkStats> {
        self.links.iter().find(|link| link.name == name)
    }
}

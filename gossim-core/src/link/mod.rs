//! Links between two nodes.
//!
//! A [`Link`] models the propagation delay between two ports: a packet
//! handed to the link with [`Link::carry`] stays in transit for exactly
//! the link's [`LinkDelay`], counted down tick after tick, before it is
//! put in the port of the node at the other end.

use crate::{
    element::{
        ElementError, ElementId, ElementKind, ElementState, PacketSink as _, Routable,
        TickContext, TickGeneration, Tickable,
    },
    event::{EventKind, EventSink},
    ids::IdGenerator,
    measure::LinkDelay,
    node::{ConfigError, NodeRole, PortId},
    pdu::{Address, Pdu, PduClass, PduId},
    time::nanos,
    topology::Topology,
};
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// between an LER and a node outside the MPLS domain
    External,
    /// between two routers of the MPLS domain
    Internal,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => f.write_str("ExternalLink"),
            Self::Internal => f.write_str("InternalLink"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkEnd {
    Head,
    Tail,
}

impl LinkEnd {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Head => Self::Tail,
            Self::Tail => Self::Head,
        }
    }
}

impl fmt::Display for LinkEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Tail => f.write_str("tail"),
        }
    }
}

/// One end of a link: the address of the node and the port it is plugged
/// into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkEndpoint {
    pub address: Address,
    pub port: PortId,
}

impl LinkEndpoint {
    pub fn new(address: Address, port: PortId) -> Self {
        Self { address, port }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub name: String,
    pub kind: LinkKind,
    pub delay: LinkDelay,
    pub head: LinkEndpoint,
    pub tail: LinkEndpoint,
    pub show_name: bool,
}

impl LinkConfig {
    pub fn new(
        name: impl Into<String>,
        kind: LinkKind,
        head: LinkEndpoint,
        tail: LinkEndpoint,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            delay: LinkDelay::default(),
            head,
            tail,
            show_name: true,
        }
    }

    pub fn set_delay(mut self, delay: LinkDelay) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_show_name(mut self, show_name: bool) -> Self {
        self.show_name = show_name;
        self
    }

    pub fn endpoint(&self, end: LinkEnd) -> LinkEndpoint {
        match end {
            LinkEnd::Head => self.head,
            LinkEnd::Tail => self.tail,
        }
    }
}

#[derive(Debug, Clone)]
struct LinkBufferEntry {
    pdu: Pdu,
    /// the end the packet travels to
    end: LinkEnd,
    total: u64,
    remaining: u64,
    generation: TickGeneration,
}

impl LinkBufferEntry {
    fn percentage(&self) -> u8 {
        let done = self.total - self.remaining;
        (done.saturating_mul(100) / self.total.max(1)) as u8
    }
}

/// Read-only view of a packet in transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitView {
    pub pdu: PduId,
    pub end: LinkEnd,
    pub total: u64,
    pub remaining: u64,
}

/// A packet dropped from the buffers when the link broke.
#[derive(Debug, Clone)]
pub struct LostInTransit {
    pub pdu: Pdu,
    /// the node the packet was travelling to
    pub node: Option<ElementId>,
}

/// Packets in transit, ordered by packet identifier (i.e. creation
/// order). The sequence number keeps apart two copies of the same packet.
#[derive(Debug, Default)]
struct InTransit {
    entries: BTreeMap<(PduId, u64), LinkBufferEntry>,
    seq: u64,
}

pub struct Link {
    state: ElementState,
    config: LinkConfig,

    head_node: Option<ElementId>,
    tail_node: Option<ElementId>,


    in_transit: Mutex<InTransit>,
    delivered: Mutex<Vec<LinkBufferEntry>>,
}

impl Link {
    pub(crate) fn new(
        id: ElementId,
        config: LinkConfig,
        head_node: Option<ElementId>,
        tail_node: Option<ElementId>,
        event_ids: IdGenerator,
    ) -> Self {
        Self {
            state: ElementState::new(id, ElementKind::Link, event_ids),
            config,
            head_node,
            tail_node,
            in_transit: Mutex::new(InTransit::default()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> ElementId {
        self.state.id()
    }

    pub fn state(&self) -> &ElementState {
        &self.state
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn kind(&self) -> LinkKind {
        self.config.kind
    }

    pub fn delay(&self) -> LinkDelay {
        self.config.delay
    }

    pub fn endpoint(&self, end: LinkEnd) -> LinkEndpoint {
        self.config.endpoint(end)
    }

    /// The node plugged at `end`, `None` if it did not exist when the
    /// link was added to the topology.
    pub fn node_at(&self, end: LinkEnd) -> Option<ElementId> {
        match end {
            LinkEnd::Head => self.head_node,
            LinkEnd::Tail => self.tail_node,
        }
    }

    /// The end `node` is plugged into.
    pub fn end_of(&self, node: ElementId) -> Option<LinkEnd> {
        if self.head_node == Some(node) {
            Some(LinkEnd::Head)
        } else if self.tail_node == Some(node) {
            Some(LinkEnd::Tail)
        } else {
            None
        }
    }

    pub fn subscribe(
        &self,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), crate::element::SubscriptionConflict> {
        self.state.subscribe(sink)
    }

    /// A broken link is an element that is not alive.
    pub fn is_broken(&self) -> bool {
        !self.state.is_alive()
    }

    /// The delay of the link in nanoseconds.
    pub fn weight(&self) -> u64 {
        self.config.delay.as_nanos()
    }

    /// Put `pdu` in transit towards `end`.
    ///
    /// `generation` is the tick during which the packet is handed over:
    /// its delay only starts to count down on the following tick. On a
    /// broken link the packet is discarded on the spot and `false` is
    /// returned.
    pub fn carry(
        &self,
        pdu: Pdu,
        end: LinkEnd,
        generation: TickGeneration,
    ) -> Result<bool, ElementError> {
        if self.is_broken() {
            let source = self.node_at(end.opposite()).unwrap_or(self.id());
            trace!(link = %self.id(), pdu = %pdu.id(), "discarded on a broken link");
            self.state.emit_as(
                source,
                EventKind::PacketDiscarded {
                    pdu: pdu.id(),
                    class: pdu.class(),
                },
            )?;
            return Ok(false);
        }

        let total = self.config.delay.as_nanos();
        let mut in_transit = self.in_transit.lock();
        let seq = in_transit.seq;
        in_transit.seq = seq.wrapping_add(1);
        in_transit.entries.insert(
            (pdu.id(), seq),
            LinkBufferEntry {
                pdu,
                end,
                total,
                remaining: total,
                generation,
            },
        );
        Ok(true)
    }

    /// Break or recover the link.
    ///
    /// Breaking drains both buffers (one discard event per packet, on
    /// behalf of the node it was travelling to) then emits
    /// [`EventKind::LinkBroken`]. The dropped packets are returned so the
    /// caller can account for them. Setting the current value again does
    /// nothing.
    pub fn set_broken(&self, broken: bool) -> Result<Vec<LostInTransit>, ElementError> {
        if self.state.swap_alive(!broken) != broken {
            return Ok(Vec::new());
        }

        if !broken {
            debug!(link = %self.id(), "recovered");
            self.state.emit(EventKind::LinkRecovered)?;
            return Ok(Vec::new());
        }

        let mut entries: Vec<LinkBufferEntry> = std::mem::take(&mut self.in_transit.lock().entries)
            .into_values()
            .collect();
        entries.append(&mut self.delivered.lock());

        let mut lost = Vec::with_capacity(entries.len());
        for entry in entries {
            let node = self.node_at(entry.end);
            self.state.emit_as(
                node.unwrap_or(self.id()),
                EventKind::PacketDiscarded {
                    pdu: entry.pdu.id(),
                    class: entry.pdu.class(),
                },
            )?;
            lost.push(LostInTransit {
                pdu: entry.pdu,
                node,
            });
        }

        debug!(link = %self.id(), lost = lost.len(), "broken");
        self.state.emit(EventKind::LinkBroken)?;
        Ok(lost)
    }

    /// Packets still counting down their delay.
    pub fn in_transit(&self) -> Vec<TransitView> {
        self.in_transit
            .lock()
            .entries
            .values()
            .map(|entry| TransitView {
                pdu: entry.pdu.id(),
                end: entry.end,
                total: entry.total,
                remaining: entry.remaining,
            })
            .collect()
    }

    pub fn delivered_len(&self) -> usize {
        self.delivered.lock().len()
    }

    /// Checks the link against the nodes of `topology`.
    pub fn validate_config(&self, topology: &Topology) -> Result<(), ConfigError> {
        if !self.config.delay.is_valid() {
            return Err(ConfigError::DelayOutOfRange);
        }

        let mut roles = Vec::with_capacity(2);
        for end in [LinkEnd::Head, LinkEnd::Tail] {
            let endpoint = self.endpoint(end);
            let node = self
                .node_at(end)
                .and_then(|id| topology.node(id))
                .ok_or(ConfigError::MissingEndNode {
                    address: endpoint.address,
                })?;

            let Some(port) = node.port_binding(endpoint.port) else {
                return Err(ConfigError::PortOutOfRange {
                    node: node.id(),
                    port: endpoint.port,
                });
            };
            if port.is_some_and(|binding| binding.link != self.id()) {
                return Err(ConfigError::PortInUse {
                    node: node.id(),
                    port: endpoint.port,
                });
            }
            roles.push(node.role().clone());
        }

        if self.head_node == self.tail_node {
            return Err(ConfigError::SameEndNodes);
        }

        match self.config.kind {
            LinkKind::External => {
                let outside = roles.iter().filter(|role| !role.in_domain()).count();
                let edge = roles
                    .iter()
                    .filter(|role| matches!(role, NodeRole::Ler(_)))
                    .count();
                if outside != 1 || edge != 1 {
                    return Err(ConfigError::WrongKindForEnds {
                        reason: "an external link joins an LER to a sender or a receiver",
                    });
                }
            }
            LinkKind::Internal => {
                if !roles.iter().all(NodeRole::is_router) {
                    return Err(ConfigError::WrongKindForEnds {
                        reason: "an internal link joins two routers",
                    });
                }
            }
        }

        Ok(())
    }

    /// Count down the delay of the packets handed over before this tick
    /// and move the ones that made it to the delivered buffer.
    fn update_transit(&self, ctx: &TickContext<'_>) -> Result<(), ElementError> {
        let tick = nanos(ctx.tick_duration());
        let generation = ctx.generation();

        let mut on_fly = Vec::new();
        {
            let mut in_transit = self.in_transit.lock();

            let mut arrived = Vec::new();
            for (key, entry) in in_transit.entries.iter_mut() {
                if entry.generation >= generation {
                    continue;
                }
                entry.remaining = entry.remaining.saturating_sub(tick);
                if entry.remaining == 0 {
                    arrived.push(*key);
                }
            }

            let mut delivered = self.delivered.lock();
            for key in arrived {
                if let Some(entry) = in_transit.entries.remove(&key) {
                    delivered.push(entry);
                }
            }

            for entry in in_transit.entries.values() {
                on_fly.push((entry.pdu.id(), entry.pdu.class(), entry.end, entry.percentage()));
            }
        }

        for (pdu, class, end, percentage) in on_fly {
            self.emit_on_fly(pdu, class, end, percentage)?;
        }
        Ok(())
    }

    fn emit_on_fly(
        &self,
        pdu: PduId,
        class: PduClass,
        end: LinkEnd,
        percentage: u8,
    ) -> Result<(), ElementError> {
        self.state.emit(EventKind::PacketOnFly {
            pdu,
            class,
            end,
            percentage,
        })?;
        Ok(())
    }

    /// Hand the delivered packets over to the nodes, without holding any
    /// of the link's locks.
    fn deliver(&self, ctx: &TickContext<'_>) -> Result<(), ElementError> {
        let delivered = std::mem::take(&mut *self.delivered.lock());

        for entry in delivered {
            let endpoint = self.endpoint(entry.end);
            let node_id = self
                .node_at(entry.end)
                .ok_or(ElementError::UnknownElement(self.id()))?;
            let node = ctx
                .topology
                .node(node_id)
                .ok_or(ElementError::UnknownElement(node_id))?;

            trace!(link = %self.id(), node = %node_id, pdu = %entry.pdu.id(), "delivered");
            node.put_packet(entry.pdu, endpoint.port, ctx.generation())?;
        }
        Ok(())
    }

    /// Drop every packet in the buffers and return to time zero.
    pub(crate) fn reset(&self) {
        *self.in_transit.lock() = InTransit::default();
        self.delivered.lock().clear();
        self.state.reset();
    }
}

impl Tickable for Link {
    fn receive_timer_event(&self, ctx: &TickContext<'_>) -> Result<(), ElementError> {
        self.state.on_timer(&ctx.timer)?;

        if self.is_broken() {
            return Ok(());
        }

        self.update_transit(ctx)?;
        self.deliver(ctx)
    }
}

impl Routable for Link {
    /// Same as [`Link::weight`]; a broken link cannot be routed through.
    fn routing_weight(&self) -> Option<u64> {
        (!self.is_broken()).then(|| self.weight())
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id())
            .field("config", &self.config)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

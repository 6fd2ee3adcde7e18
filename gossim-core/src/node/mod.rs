//! The nodes of the topology.
//!
//! Every [`Node`] owns a set of ports, its statistics and the state of its
//! role: a [`Sender`](NodeRole::Sender) generates traffic, a
//! [`Receiver`](NodeRole::Receiver) sinks it, and the routers
//! ([`Ler`](NodeRole::Ler) and [`Lsr`](NodeRole::Lsr)) switch it inside
//! the MPLS domain.
//!
//! All the mutable state of a node sits behind a single lock: the node's
//! own tick job and [`Node::put_packet`], called by the links delivering
//! packets, are the only ones taking it.

mod config;
mod port;
mod receiver;
mod recovery;
mod router;
mod sender;

use self::{router::RouterState, sender::SenderState};
use crate::{
    defaults::ROUTER_PORTS_RANGE,
    element::{
        ElementError, ElementId, ElementKind, ElementState, PacketSink, Routable,
        SubscriptionConflict, TickContext, TickGeneration, Tickable,
    },
    event::{EventKind, EventSink},
    ids::IdGenerator,
    link::Link,
    measure::NsCredit,
    pdu::{Address, Pdu, PduId},
    routing::Hop,
    stats::{Direction, Stats},
    time::{TimeInstant, nanos},
    topology::Topology,
};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};
use tracing::trace;

pub use self::{
    config::{ConfigError, NodeConfig, NodeRole, PayloadMode, RouterConfig, SenderConfig},
    port::{Port, PortBinding, PortId, PortSet},
    sender::PAYLOAD_DISTRIBUTION,
};

enum RoleState {
    Sender(SenderState),
    Receiver,
    Router(RouterState),
}

struct NodeInner {
    ports: PortSet,
    stats: Stats,
    credit: NsCredit,
    ticks_without_emitting: u64,
    role: RoleState,
}

pub struct Node {
    state: ElementState,
    config: NodeConfig,
    pdu_ids: IdGenerator,
    seed: u64,
    inner: Mutex<NodeInner>,
}

impl NodeInner {
    fn new(config: &NodeConfig, seed: u64) -> Self {
        // validation reports the configured count, never allocate more
        let router_ports = config.ports.min(*ROUTER_PORTS_RANGE.end());
        let (ports, role) = match &config.role {
            NodeRole::Sender(sender) => (
                PortSet::unlimited(1),
                RoleState::Sender(SenderState::new(sender.clone(), seed)),
            ),
            NodeRole::Receiver => (PortSet::unlimited(1), RoleState::Receiver),
            NodeRole::Ler(router) => (
                PortSet::bounded(router_ports, router.buffer_bytes()),
                RoleState::Router(RouterState::new(*router, true)),
            ),
            NodeRole::Lsr(router) => (
                PortSet::bounded(router_ports, router.buffer_bytes()),
                RoleState::Router(RouterState::new(*router, false)),
            ),
        };
        Self {
            ports,
            stats: Stats::new(config.address, config.stats_enabled),
            credit: NsCredit::ZERO,
            ticks_without_emitting: 0,
            role,
        }
    }
}

impl Node {
    pub(crate) fn new(
        id: ElementId,
        config: NodeConfig,
        pdu_ids: IdGenerator,
        event_ids: IdGenerator,
        seed: u64,
    ) -> Self {
        let inner = NodeInner::new(&config, seed);
        Self {
            state: ElementState::new(id, ElementKind::Node, event_ids),
            config,
            pdu_ids,
            seed,
            inner: Mutex::new(inner),
        }
    }

    #[inline]
    pub fn id(&self) -> ElementId {
        self.state.id()
    }

    pub fn state(&self) -> &ElementState {
        &self.state
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn role(&self) -> &NodeRole {
        &self.config.role
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> Result<(), SubscriptionConflict> {
        self.state.subscribe(sink)
    }

    pub fn is_well_configured(&self) -> bool {
        self.state.is_well_configured()
    }

    pub fn has_available_ports(&self) -> bool {
        self.inner.lock().ports.has_available_ports()
    }

    /// `None` if the node has no such port, otherwise what the port is
    /// plugged into.
    pub fn port_binding(&self, port: PortId) -> Option<Option<PortBinding>> {
        self.inner.lock().ports.port(port).map(Port::binding)
    }

    pub(crate) fn bind_port(&self, port: PortId, binding: PortBinding) {
        self.inner.lock().ports.bind(port, binding);
    }

    /// Packets waiting in the ports.
    pub fn queued(&self) -> usize {
        self.inner
            .lock()
            .ports
            .ports()
            .map(|(_, port)| port.len())
            .sum()
    }

    /// Bytes waiting in the ports.
    pub fn queued_bytes(&self) -> u64 {
        self.inner.lock().ports.used()
    }

    /// Consecutive ticks during which the node sent nothing.
    pub fn ticks_without_emitting(&self) -> u64 {
        self.inner.lock().ticks_without_emitting
    }

    pub fn stats(&self) -> Stats {
        self.inner.lock().stats.clone()
    }

    pub(crate) fn consolidate_stats(&self, instant: TimeInstant) {
        self.inner.lock().stats.consolidate(instant);
    }

    /// The label this node pushes or swaps towards `fec`, once the LSP is
    /// established. Always `None` for senders and receivers.
    pub fn established_label(&self, fec: Address) -> Option<u32> {
        match &self.inner.lock().role {
            RoleState::Router(router) => router.established_label(fec),
            RoleState::Sender(_) | RoleState::Receiver => None,
        }
    }

    /// Packets kept by an active router for retransmission.
    pub fn dmgp_len(&self) -> usize {
        match &self.inner.lock().role {
            RoleState::Router(router) => router.dmgp_len(),
            RoleState::Sender(_) | RoleState::Receiver => 0,
        }
    }

    /// Account a packet that was on its way to this node when the link
    /// carrying it broke.
    pub(crate) fn account_lost(&self, pdu: &Pdu) {
        let mut inner = self.inner.lock();
        let NodeInner { stats, role, .. } = &mut *inner;
        stats.account(pdu, Direction::Discarded);
        if let RoleState::Router(router) = role {
            router.record_loss(pdu, self.address());
        }
    }

    /// Checks the node against the rest of `topology`.
    pub fn validate_config(&self, topology: &Topology) -> Result<(), ConfigError> {
        self.config.validate()?;

        let same_name = topology
            .nodes()
            .filter(|node| node.id() != self.id())
            .map(|node| node.name())
            .chain(topology.links().map(|link| link.name()))
            .any(|name| name == self.name());
        if same_name {
            return Err(ConfigError::DuplicateName {
                name: self.name().to_owned(),
            });
        }

        let same_address = topology
            .nodes()
            .any(|node| node.id() != self.id() && node.address() == self.address());
        if same_address {
            return Err(ConfigError::DuplicateAddress {
                address: self.address(),
            });
        }

        if let NodeRole::Sender(sender) = self.role() {
            let target_is_receiver = topology
                .node_by_address(sender.target)
                .is_some_and(|node| matches!(node.role(), NodeRole::Receiver));
            if !target_is_receiver {
                return Err(ConfigError::TargetMissing {
                    target: sender.target,
                });
            }
        }

        Ok(())
    }

    /// Back to the state the node had when it was added, keeping its port
    /// bindings and its event sink.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        let mut fresh = NodeInner::new(&self.config, self.seed);
        std::mem::swap(&mut fresh.ports, &mut inner.ports);
        fresh.ports.clear();
        *inner = fresh;
        drop(inner);
        self.state.reset();
    }
}

impl Tickable for Node {
    fn receive_timer_event(&self, ctx: &TickContext<'_>) -> Result<(), ElementError> {
        self.state.on_timer(&ctx.timer)?;

        let mut inner = self.inner.lock();
        let NodeInner {
            ports,
            stats,
            credit,
            ticks_without_emitting,
            role,
        } = &mut *inner;

        credit.accrue(nanos(ctx.tick_duration()));

        let mut io = NodeIo {
            node: self,
            ctx,
            ports,
            stats,
            emitted: false,
        };
        match role {
            RoleState::Sender(sender) => sender.tick(&mut io, credit)?,
            RoleState::Receiver => {
                receiver::tick(&mut io)?;
                credit.clear();
            }
            RoleState::Router(router) => router.tick(&mut io, credit)?,
        }

        if io.emitted {
            *ticks_without_emitting = 0;
        } else {
            *ticks_without_emitting += 1;
        }
        Ok(())
    }
}

impl PacketSink for Node {
    fn put_packet(
        &self,
        pdu: Pdu,
        port: PortId,
        generation: TickGeneration,
    ) -> Result<(), ElementError> {
        let mut inner = self.inner.lock();
        let NodeInner {
            ports, stats, role, ..
        } = &mut *inner;

        let Err(pdu) = ports.push(port, pdu, generation) else {
            return Ok(());
        };

        trace!(node = %self.id(), pdu = %pdu.id(), %port, "no room in the ports");
        stats.account(&pdu, Direction::Discarded);
        if let RoleState::Router(router) = role {
            router.record_loss(&pdu, self.address());
        }
        self.state.emit(EventKind::PacketDiscarded {
            pdu: pdu.id(),
            class: pdu.class(),
        })?;
        Ok(())
    }
}

impl Routable for Node {
    /// Crossing a node costs nothing, only links are weighted.
    fn routing_weight(&self) -> Option<u64> {
        Some(0)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What a role may do during a tick: take packets from the ports, send,
/// discard and account them, publish events.
struct NodeIo<'a> {
    node: &'a Node,
    ctx: &'a TickContext<'a>,
    ports: &'a mut PortSet,
    stats: &'a mut Stats,
    emitted: bool,
}

impl<'a> NodeIo<'a> {
    fn id(&self) -> ElementId {
        self.node.id()
    }

    fn address(&self) -> Address {
        self.node.address()
    }

    fn generation(&self) -> TickGeneration {
        self.ctx.generation()
    }

    fn next_pdu_id(&self) -> Result<PduId, ElementError> {
        Ok(PduId::generate(&self.node.pdu_ids)?)
    }

    fn emit(&self, kind: EventKind) -> Result<(), ElementError> {
        Ok(self.node.state.emit(kind)?)
    }

    fn next_hop(&self, to: Address) -> Option<Hop> {
        self.ctx.routes.next_hop(self.id(), to)
    }

    fn link(&self, port: PortId) -> Option<&'a Arc<Link>> {
        let topology: &'a Topology = self.ctx.topology;
        let binding = self.ports.port(port)?.binding()?;
        topology.link(binding.link)
    }

    /// The node at the other end of the link plugged into `port`.
    fn neighbor(&self, port: PortId) -> Option<&'a Arc<Node>> {
        let topology: &'a Topology = self.ctx.topology;
        let binding = self.ports.port(port)?.binding()?;
        let link = topology.link(binding.link)?;
        topology.node(link.node_at(binding.end.opposite())?)
    }

    fn is_in_domain(&self, node: ElementId) -> bool {
        self.ctx
            .topology
            .node(node)
            .is_some_and(|node| node.role().in_domain())
    }

    fn receive(&mut self, pdu: &Pdu, port: Option<PortId>) -> Result<(), ElementError> {
        self.stats.account(pdu, Direction::Incoming);
        self.emit(EventKind::PacketReceived {
            pdu: pdu.id(),
            class: pdu.class(),
            port,
        })
    }

    fn discard(&mut self, pdu: Pdu) -> Result<(), ElementError> {
        trace!(node = %self.id(), pdu = %pdu.id(), class = %pdu.class(), "discarded");
        self.stats.account(&pdu, Direction::Discarded);
        self.emit(EventKind::PacketDiscarded {
            pdu: pdu.id(),
            class: pdu.class(),
        })
    }

    /// Put `pdu` on the link plugged into `port`. Without a working link
    /// the packet is discarded.
    fn send(&mut self, port: PortId, pdu: Pdu) -> Result<(), ElementError> {
        let Some(binding) = self.ports.port(port).and_then(Port::binding) else {
            return self.discard(pdu);
        };
        let Some(link) = self.link(port).filter(|link| !link.is_broken()) else {
            return self.discard(pdu);
        };

        let (id, class) = (pdu.id(), pdu.class());
        self.stats.account(&pdu, Direction::Outgoing);
        self.emitted = true;
        if link.carry(pdu, binding.end.opposite(), self.generation())? {
            self.emit(EventKind::PacketSent {
                pdu: id,
                class,
                port,
            })?;
        }
        Ok(())
    }

    /// Send `pdu` towards its destination address.
    fn route(&mut self, pdu: Pdu) -> Result<(), ElementError> {
        match self.next_hop(pdu.destination()) {
            Some(hop) => self.send(hop.port, pdu),
            None => self.discard(pdu),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use std::time::Duration;

    #[test]
    fn unroutable_packets_are_discarded() {
        let target = Address::new(10, 0, 0, 2);
        let mut topology = Topology::new();
        let sender = topology.add_node(NodeConfig::sender(
            "s",
            Address::new(10, 0, 0, 1),
            SenderConfig::new(target)
                .set_rate("1000mbps".parse().unwrap())
                .set_payload(PayloadMode::Constant(105)),
        ));
        let receiver = topology.add_node(NodeConfig::receiver("r", target));

        let mut clock = Clock::new(Duration::from_micros(1), Duration::from_micros(3), 1).unwrap();
        clock.run_until_finished(&topology).unwrap();

        // 125 bytes take exactly one tick at 1 Gbps
        let sender = topology.node(sender).unwrap();
        let stats = sender.stats();
        assert_eq!(stats.total_by_direction(Direction::Discarded), 3);
        assert_eq!(stats.total_by_direction(Direction::Outgoing), 0);
        assert_eq!(sender.ticks_without_emitting(), 3);
        assert_eq!(sender.queued(), 0);

        let receiver = topology.node(receiver).unwrap();
        assert_eq!(receiver.ticks_without_emitting(), 3);
        assert_eq!(receiver.stats().total_by_direction(Direction::Incoming), 0);
    }

    #[test]
    fn port_allocation_is_capped() {
        let mut topology = Topology::new();
        let id = topology.add_node(
            NodeConfig::lsr("core", Address::new(10, 0, 0, 1), RouterConfig::default())
                .set_ports(usize::MAX),
        );

        let node = topology.node(id).unwrap();
        assert!(node.port_binding(PortId::new(31)).is_some());
        assert!(node.port_binding(PortId::new(32)).is_none());

        let errors = topology.validate();
        assert!(matches!(
            errors[..],
            [(_, ConfigError::PortCountOutOfRange { count: usize::MAX, .. })]
        ));
    }

    #[test]
    fn reset_keeps_identity() {
        let mut topology = Topology::new();
        let id = topology.add_node(NodeConfig::receiver("r", Address::new(10, 0, 0, 1)));

        let mut clock = Clock::new(Duration::from_nanos(100), Duration::from_nanos(500), 1).unwrap();
        clock.run_until_finished(&topology).unwrap();
        let node = topology.node(id).unwrap();
        assert_eq!(node.ticks_without_emitting(), 5);

        node.reset();
        assert_eq!(node.id(), id);
        assert_eq!(node.name(), "r");
        assert_eq!(node.ticks_without_emitting(), 0);
    }
}

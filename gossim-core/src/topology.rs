//! The nodes and links of a simulation.
//!
//! The [`Topology`] owns every element and the identifier generators they
//! share. Elements are added while building the scenario; once the
//! [`Clock`](crate::clock::Clock) runs the topology is only shared
//! read-only, breaking and recovering links being the only structural
//! changes allowed during a run.

use crate::{
    defaults::DEFAULT_SEED,
    element::{ElementError, ElementId, Routable, SubscriptionConflict, TickContext, Tickable},
    event::EventSink,
    ids::IdGenerator,
    link::{Link, LinkConfig, LinkEnd},
    node::{ConfigError, Node, NodeConfig, PortBinding},
    pdu::Address,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::debug;

/// Any element of the topology.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    Node(&'a Arc<Node>),
    Link(&'a Arc<Link>),
}

impl Element<'_> {
    pub fn id(&self) -> ElementId {
        match self {
            Self::Node(node) => node.id(),
            Self::Link(link) => link.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Node(node) => node.name(),
            Self::Link(link) => link.name(),
        }
    }
}

impl Tickable for Element<'_> {
    fn receive_timer_event(&self, ctx: &TickContext<'_>) -> Result<(), ElementError> {
        match self {
            Self::Node(node) => node.receive_timer_event(ctx),
            Self::Link(link) => link.receive_timer_event(ctx),
        }
    }
}

impl Routable for Element<'_> {
    fn routing_weight(&self) -> Option<u64> {
        match self {
            Self::Node(node) => node.routing_weight(),
            Self::Link(link) => link.routing_weight(),
        }
    }
}

pub struct Topology {
    seed: u64,
    /// the last assigned element identifier, `0` is never given
    last_id: ElementId,

    nodes: BTreeMap<ElementId, Arc<Node>>,
    links: BTreeMap<ElementId, Arc<Link>>,
    addresses: HashMap<Address, ElementId>,

    pdu_ids: IdGenerator,
    event_ids: IdGenerator,

    /// a link was broken or recovered since the routes were last computed
    routing_dirty: AtomicBool,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// The random generator of every sender is seeded from `seed` and the
    /// sender's identifier.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            last_id: ElementId::ZERO,
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            addresses: HashMap::new(),
            pdu_ids: IdGenerator::new("pdu"),
            event_ids: IdGenerator::new("event"),
            routing_dirty: AtomicBool::new(true),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn next_id(&mut self) -> ElementId {
        self.last_id = self.last_id.next();
        self.last_id
    }

    pub fn add_node(&mut self, config: NodeConfig) -> ElementId {
        let id = self.next_id();
        let seed = self.seed.wrapping_add(id.into_u64());

        // the first node of an address wins, the others fail validation
        self.addresses.entry(config.address).or_insert(id);

        let node = Node::new(
            id,
            config,
            self.pdu_ids.clone(),
            self.event_ids.clone(),
            seed,
        );
        debug!(node = %id, name = node.name(), address = %node.address(), "node added");
        self.nodes.insert(id, Arc::new(node));
        self.routing_dirty.store(true, Ordering::SeqCst);
        id
    }

    /// Add a link between the nodes at the addresses of its endpoints.
    ///
    /// The ports of the end nodes are plugged into the link when both
    /// exist and are free. Anything wrong is reported by
    /// [`Topology::validate`].
    pub fn add_link(&mut self, config: LinkConfig) -> ElementId {
        let id = self.next_id();
        let head = self.addresses.get(&config.head.address).copied();
        let tail = self.addresses.get(&config.tail.address).copied();

        if let (Some(head), Some(tail)) = (head, tail) {
            let plug = [(head, LinkEnd::Head), (tail, LinkEnd::Tail)]
                .map(|(node, end)| (self.nodes.get(&node), config.endpoint(end).port, end));
            let free = plug.iter().all(|(node, port, _)| {
                node.and_then(|node| node.port_binding(*port))
                    .is_some_and(|binding| binding.is_none())
            });
            if free && head != tail {
                for (node, port, end) in plug {
                    if let Some(node) = node {
                        node.bind_port(port, PortBinding { link: id, end });
                    }
                }
            }
        }

        let link = Link::new(id, config, head, tail, self.event_ids.clone());
        debug!(link = %id, name = link.name(), "link added");
        self.links.insert(id, Arc::new(link));
        self.routing_dirty.store(true, Ordering::SeqCst);
        id
    }

    /// Check every element against the rest of the topology, marking the
    /// ones that pass as well configured.
    pub fn validate(&self) -> Vec<(ElementId, ConfigError)> {
        let mut errors = Vec::new();

        for node in self.nodes.values() {
            let result = node.validate_config(self);
            node.state().set_well_configured(result.is_ok());
            if let Err(error) = result {
                errors.push((node.id(), error));
            }
        }
        for link in self.links.values() {
            let result = link.validate_config(self);
            link.state().set_well_configured(result.is_ok());
            if let Err(error) = result {
                errors.push((link.id(), error));
            }
        }

        errors
    }

    pub fn node(&self, id: ElementId) -> Option<&Arc<Node>> {
        self.nodes.get(&id)
    }

    pub fn link(&self, id: ElementId) -> Option<&Arc<Link>> {
        self.links.get(&id)
    }

    pub fn node_by_address(&self, address: Address) -> Option<&Arc<Node>> {
        self.addresses
            .get(&address)
            .and_then(|id| self.nodes.get(id))
    }

    /// Nodes in identifier order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    /// Links in identifier order.
    pub fn links(&self) -> impl Iterator<Item = &Arc<Link>> {
        self.links.values()
    }

    /// Every element, links first.
    pub fn elements(&self) -> Vec<Element<'_>> {
        self.links
            .values()
            .map(Element::Link)
            .chain(self.nodes.values().map(Element::Node))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// Break or recover a link between two ticks.
    ///
    /// The packets that were on the link when it broke are accounted as
    /// discarded by the node they were travelling to.
    pub fn set_link_broken(&self, id: ElementId, broken: bool) -> Result<(), ElementError> {
        let link = self.link(id).ok_or(ElementError::UnknownElement(id))?;
        if link.is_broken() == broken {
            return Ok(());
        }

        for lost in link.set_broken(broken)? {
            if let Some(node) = lost.node.and_then(|node| self.node(node)) {
                node.account_lost(&lost.pdu);
            }
        }
        self.routing_dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// `true` if the routes must be computed again, clearing the flag.
    pub fn take_routing_dirty(&self) -> bool {
        self.routing_dirty.swap(false, Ordering::SeqCst)
    }

    /// Bind `sink` to every element.
    pub fn subscribe_all(&self, sink: Arc<dyn EventSink>) -> Result<(), SubscriptionConflict> {
        for link in self.links.values() {
            link.subscribe(Arc::clone(&sink))?;
        }
        for node in self.nodes.values() {
            node.subscribe(Arc::clone(&sink))?;
        }
        Ok(())
    }

    /// Back to time zero: buffers, ports, statistics and identifier
    /// sequences are emptied, links are recovered. Elements keep their
    /// identifier, their port bindings and their event sink.
    pub fn reset(&self) {
        for link in self.links.values() {
            link.reset();
        }
        for node in self.nodes.values() {
            node.reset();
        }
        self.pdu_ids.reset();
        self.event_ids.reset();
        self.routing_dirty.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::EventLog,
        link::{LinkEndpoint, LinkKind},
        node::{PortId, RouterConfig},
    };

    fn addr(last: u8) -> Address {
        Address::new(10, 0, 0, last)
    }

    fn endpoint(last: u8, port: u16) -> LinkEndpoint {
        LinkEndpoint::new(addr(last), PortId::new(port))
    }

    #[test]
    fn identifiers_are_shared_by_nodes_and_links() {
        let mut topology = Topology::new();
        let a = topology.add_node(NodeConfig::lsr("a", addr(1), RouterConfig::default()));
        let b = topology.add_node(NodeConfig::lsr("b", addr(2), RouterConfig::default()));
        let link = topology.add_link(LinkConfig::new(
            "a-b",
            LinkKind::Internal,
            endpoint(1, 0),
            endpoint(2, 0),
        ));

        assert_eq!([a, b, link].map(ElementId::into_u64), [1, 2, 3]);
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.elements()[0].id(), link);
    }

    #[test]
    fn ports_are_bound_when_free() {
        let mut topology = Topology::new();
        let a = topology.add_node(NodeConfig::lsr("a", addr(1), RouterConfig::default()));
        topology.add_node(NodeConfig::lsr("b", addr(2), RouterConfig::default()));
        topology.add_node(NodeConfig::lsr("c", addr(3), RouterConfig::default()));

        let first = topology.add_link(LinkConfig::new(
            "a-b",
            LinkKind::Internal,
            endpoint(1, 0),
            endpoint(2, 0),
        ));
        let second = topology.add_link(LinkConfig::new(
            "a-c",
            LinkKind::Internal,
            endpoint(1, 0),
            endpoint(3, 0),
        ));

        let node = topology.node(a).unwrap();
        assert_eq!(
            node.port_binding(PortId::new(0)).unwrap().unwrap().link,
            first
        );

        let errors = topology.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, second);
        assert!(matches!(errors[0].1, ConfigError::PortInUse { .. }));
        assert!(topology.link(first).unwrap().state().is_well_configured());
        assert!(!topology.link(second).unwrap().state().is_well_configured());
    }

    #[test]
    fn duplicate_addresses_are_reported() {
        let mut topology = Topology::new();
        topology.add_node(NodeConfig::receiver("a", addr(1)));
        let b = topology.add_node(NodeConfig::receiver("b", addr(1)));

        let errors = topology.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|(id, _)| *id == b));
        assert!(
            errors
                .iter()
                .all(|(_, error)| matches!(error, ConfigError::DuplicateAddress { .. }))
        );
    }

    #[test]
    fn breaking_marks_the_routes_dirty() {
        let mut topology = Topology::new();
        topology.add_node(NodeConfig::lsr("a", addr(1), RouterConfig::default()));
        topology.add_node(NodeConfig::lsr("b", addr(2), RouterConfig::default()));
        let link = topology.add_link(LinkConfig::new(
            "a-b",
            LinkKind::Internal,
            endpoint(1, 0),
            endpoint(2, 0),
        ));

        assert!(topology.take_routing_dirty());
        assert!(!topology.take_routing_dirty());

        topology.set_link_broken(link, true).unwrap();
        assert!(topology.take_routing_dirty());
        // already broken
        topology.set_link_broken(link, true).unwrap();
        assert!(!topology.take_routing_dirty());

        assert!(matches!(
            topology.set_link_broken(ElementId::new(42), true),
            Err(ElementError::UnknownElement(_))
        ));
    }

    #[test]
    fn one_sink_per_topology() {
        let mut topology = Topology::new();
        topology.add_node(NodeConfig::receiver("r", addr(1)));

        topology.subscribe_all(Arc::new(EventLog::new())).unwrap();
        assert!(topology.subscribe_all(Arc::new(EventLog::new())).is_err());
    }
}
